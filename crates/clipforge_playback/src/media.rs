// SPDX-License-Identifier: MIT OR Apache-2.0
//! Native media element seam.
//!
//! Elements decode and play on their own clock. The sync manager is the
//! only code that moves them.

use crate::fetch::MediaBytes;
use clipforge_timeline::CompiledClip;

/// A native audio/video player for one clip
pub trait MediaElement {
    /// Native playback position in source time
    fn current_time_ms(&self) -> f64;

    /// Jump to a source time
    fn seek(&mut self, media_ms: f64);

    /// Start native playback
    fn play(&mut self);

    /// Stop native playback
    fn pause(&mut self);

    /// Whether native playback is stopped
    fn is_paused(&self) -> bool;

    /// Set the native playback rate
    fn set_rate(&mut self, rate: f64);

    /// Current native playback rate
    fn rate(&self) -> f64;

    /// Mute or unmute audio output
    fn set_muted(&mut self, muted: bool);

    /// Set output volume
    fn set_volume(&mut self, volume: f64);

    /// Hand buffered bytes to the element
    fn load(&mut self, data: MediaBytes);

    /// Whether the element can play from its current position
    fn is_ready(&self) -> bool;

    /// Decoding failure, if any
    fn error(&self) -> Option<String> {
        None
    }
}

/// Factory for media elements
pub trait MediaBackend {
    /// Create an element for a clip
    fn create_element(&self, clip: &CompiledClip) -> Box<dyn MediaElement>;
}

/// Where a clip's media is, as seen by the render surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaPosition {
    /// Source time to display
    pub time_ms: f64,
    /// Whether the clip is holding its last good frame
    pub degraded: bool,
}
