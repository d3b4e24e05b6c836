// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline containing multiple tracks.

use crate::error::{Result, TimelineError};
use crate::snapshot::TimelineSnapshot;
use crate::track::{Clip, ClipId, Track, TrackId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Unique identifier for a timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimelineId(pub Uuid);

impl TimelineId {
    /// Create a new random timeline ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TimelineId {
    fn default() -> Self {
        Self::new()
    }
}

/// An editable timeline of tracks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    /// Unique timeline ID
    pub id: TimelineId,
    /// Timeline name
    pub name: String,
    /// Tracks in this timeline
    tracks: IndexMap<TrackId, Track>,
    /// Declared length; no clip may end past it
    pub duration_ms: f64,
    /// Frame rate
    pub frame_rate: f64,
}

impl Timeline {
    /// Create a new timeline
    pub fn new(name: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            id: TimelineId::new(),
            name: name.into(),
            tracks: IndexMap::new(),
            duration_ms,
            frame_rate: 30.0,
        }
    }

    /// Add a track
    pub fn add_track(&mut self, track: Track) -> TrackId {
        let id = track.id;
        self.tracks.insert(id, track);
        id
    }

    /// Remove a track
    pub fn remove_track(&mut self, track_id: TrackId) -> Option<Track> {
        self.tracks.shift_remove(&track_id)
    }

    /// Get a track
    pub fn track(&self, track_id: TrackId) -> Option<&Track> {
        self.tracks.get(&track_id)
    }

    /// Get a mutable track
    pub fn track_mut(&mut self, track_id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(&track_id)
    }

    /// Get all tracks
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    /// Get track count
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Place a clip on a track, enforcing the timeline bound
    pub fn add_clip(&mut self, track_id: TrackId, clip: Clip) -> Result<ClipId> {
        if clip.end_ms() > self.duration_ms {
            return Err(TimelineError::ClipOutOfBounds {
                clip: clip.id,
                end_ms: clip.end_ms(),
                bound_ms: self.duration_ms,
            });
        }
        if self.clip(clip.id).is_some() {
            return Err(TimelineError::DuplicateClip(clip.id));
        }
        let track = self
            .tracks
            .get_mut(&track_id)
            .ok_or(TimelineError::UnknownTrack(track_id))?;
        track.add_clip(clip)
    }

    /// Find a clip on any track
    pub fn clip(&self, clip_id: ClipId) -> Option<&Clip> {
        self.tracks.values().find_map(|t| t.clip(clip_id))
    }

    /// The end of the latest clip
    pub fn content_duration(&self) -> f64 {
        self.tracks
            .values()
            .map(Track::duration)
            .fold(0.0, f64::max)
    }

    /// Convert time to frame number
    pub fn time_to_frame(&self, time_ms: f64) -> u64 {
        (time_ms.max(0.0) / 1000.0 * self.frame_rate) as u64
    }

    /// Convert frame number to time
    pub fn frame_to_time(&self, frame: u64) -> f64 {
        frame as f64 * 1000.0 / self.frame_rate
    }

    /// Check every model invariant
    pub fn validate(&self) -> Result<()> {
        if !self.duration_ms.is_finite() || self.duration_ms <= 0.0 {
            return Err(TimelineError::InvalidDuration(self.duration_ms));
        }
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(TimelineError::InvalidDuration(self.frame_rate));
        }
        let mut seen = HashSet::new();
        for track in self.tracks.values() {
            track.validate()?;
            if let Some(clip) = track.clips().iter().find(|c| !seen.insert(c.id)) {
                return Err(TimelineError::DuplicateClip(clip.id));
            }
            if let Some(clip) = track.clips().iter().find(|c| c.end_ms() > self.duration_ms) {
                return Err(TimelineError::ClipOutOfBounds {
                    clip: clip.id,
                    end_ms: clip.end_ms(),
                    bound_ms: self.duration_ms,
                });
            }
        }
        Ok(())
    }

    /// Validate and resolve into an immutable playback snapshot
    pub fn compile(&self) -> Result<TimelineSnapshot> {
        self.validate()?;
        Ok(TimelineSnapshot::build(self))
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new("Untitled Timeline", 60_000.0)
    }
}
