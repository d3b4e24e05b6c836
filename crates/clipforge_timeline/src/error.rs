// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors raised at the timeline model boundary.

use crate::keyframe::AnimatableProperty;
use crate::track::{ClipId, TrackId};
use thiserror::Error;

/// Timeline validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimelineError {
    /// Keyframe list rejected (duplicate or out-of-range offset, wrong value shape)
    #[error("Invalid keyframe data on clip {clip:?} property {property:?}: {reason}")]
    InvalidKeyframeData {
        /// Owning clip
        clip: ClipId,
        /// Animated property
        property: AnimatableProperty,
        /// What was wrong
        reason: String,
    },

    /// Two clips on one track overlap in time
    #[error("Clip {clip:?} overlaps clip {other:?} on track {track:?}")]
    ClipOverlap {
        /// Track holding both clips
        track: TrackId,
        /// Clip being placed
        clip: ClipId,
        /// Clip already occupying the range
        other: ClipId,
    },

    /// Clip extends past the timeline's declared duration
    #[error("Clip {clip:?} ends at {end_ms}ms, past the timeline bound of {bound_ms}ms")]
    ClipOutOfBounds {
        /// Offending clip
        clip: ClipId,
        /// Clip end time
        end_ms: f64,
        /// Declared timeline duration
        bound_ms: f64,
    },

    /// Trim points are not ordered inside the source
    #[error("Clip {clip:?} has invalid trim {trim_in_ms}..{trim_out_ms} (source {source_duration_ms}ms)")]
    InvalidTrim {
        /// Offending clip
        clip: ClipId,
        /// Trim-in point
        trim_in_ms: f64,
        /// Trim-out point
        trim_out_ms: f64,
        /// Source media duration
        source_duration_ms: f64,
    },

    /// Non-positive or non-finite duration
    #[error("Invalid duration {0}ms")]
    InvalidDuration(f64),

    /// Track id not present in the timeline
    #[error("Unknown track {0:?}")]
    UnknownTrack(TrackId),

    /// Clip claims a different owning track
    #[error("Clip {clip:?} references track {claimed:?} but lives on {actual:?}")]
    ClipTrackMismatch {
        /// Offending clip
        clip: ClipId,
        /// Track id stored on the clip
        claimed: TrackId,
        /// Track the clip is stored in
        actual: TrackId,
    },

    /// The same clip id is placed more than once
    #[error("Clip {0:?} appears more than once")]
    DuplicateClip(ClipId),
}

/// Result type for timeline operations
pub type Result<T> = std::result::Result<T, TimelineError>;
