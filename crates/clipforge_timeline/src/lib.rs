// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline model for ClipForge.
//!
//! This crate provides the data the playback engine reads every frame:
//! - Tracks of non-overlapping clips
//! - Clip keyframes with scalar or 2-D values
//! - Easing curves and keyframe interpolation
//! - Validation at the model boundary
//!
//! ## Architecture
//!
//! The editor mutates a [`Timeline`]. Playback never does; it works from a
//! [`TimelineSnapshot`] produced by [`Timeline::compile`], in which every
//! keyframe list has been checked and resolved into a typed [`Channel`].

pub mod channel;
pub mod easing;
pub mod error;
pub mod keyframe;
pub mod snapshot;
pub mod timeline;
pub mod track;

pub use channel::{evaluate, Channel, ChannelKey, Interpolate};
pub use easing::Easing;
pub use error::{Result, TimelineError};
pub use keyframe::{
    validate_keyframes, AnimatableProperty, CompoundValue, Keyframe, KeyframeId, KeyframeValue,
    ValueKind,
};
pub use snapshot::{ClipChannels, CompiledClip, TimelineSnapshot, Transform};
pub use timeline::{Timeline, TimelineId};
pub use track::{Clip, ClipId, EffectParams, Track, TrackId, TrackKind};
