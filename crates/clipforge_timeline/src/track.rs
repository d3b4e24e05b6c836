// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tracks and the clips placed on them.

use crate::error::{Result, TimelineError};
use crate::keyframe::{validate_keyframes, AnimatableProperty, Keyframe};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub Uuid);

impl TrackId {
    /// Create a new random track ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipId(pub Uuid);

impl ClipId {
    /// Create a new random clip ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

/// Type of track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    /// Video clips (picture and sound)
    Video,
    /// Audio-only clips
    Audio,
    /// Text overlays
    Text,
    /// Still images
    Image,
}

impl TrackKind {
    /// Get the display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Video => "Video",
            Self::Audio => "Audio",
            Self::Text => "Text",
            Self::Image => "Image",
        }
    }

    /// Whether clips on this track are backed by a playable media element
    pub fn has_media_element(&self) -> bool {
        matches!(self, Self::Video | Self::Audio)
    }

    /// Whether clips on this track carry sound
    pub fn is_audio_bearing(&self) -> bool {
        matches!(self, Self::Video | Self::Audio)
    }
}

/// Per-clip effect parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectParams {
    /// Keyframe lists keyed by the property they animate
    pub keyframes: IndexMap<AnimatableProperty, Vec<Keyframe>>,
}

/// A placed media reference on a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Unique clip ID
    pub id: ClipId,
    /// Owning track
    pub track_id: TrackId,
    /// Media source location
    pub source_url: String,
    /// Placement on the timeline
    pub start_ms: f64,
    /// Length on the timeline
    pub duration_ms: f64,
    /// First used position in the source
    pub trim_in_ms: f64,
    /// Last used position in the source
    pub trim_out_ms: f64,
    /// Full length of the source media
    pub source_duration_ms: f64,
    /// Animated properties
    #[serde(default)]
    pub effect_params: EffectParams,
}

impl Clip {
    /// Create a clip using the whole source
    pub fn new(
        track_id: TrackId,
        source_url: impl Into<String>,
        start_ms: f64,
        duration_ms: f64,
    ) -> Self {
        Self {
            id: ClipId::new(),
            track_id,
            source_url: source_url.into(),
            start_ms,
            duration_ms,
            trim_in_ms: 0.0,
            trim_out_ms: duration_ms,
            source_duration_ms: duration_ms,
            effect_params: EffectParams::default(),
        }
    }

    /// Set trim points and the source length
    pub fn with_trim(mut self, trim_in_ms: f64, trim_out_ms: f64, source_duration_ms: f64) -> Self {
        self.trim_in_ms = trim_in_ms;
        self.trim_out_ms = trim_out_ms;
        self.source_duration_ms = source_duration_ms;
        self
    }

    /// Set the keyframes of one property
    pub fn with_keyframes(mut self, property: AnimatableProperty, keyframes: Vec<Keyframe>) -> Self {
        self.effect_params.keyframes.insert(property, keyframes);
        self
    }

    /// Timeline time where the clip ends
    pub fn end_ms(&self) -> f64 {
        self.start_ms + self.duration_ms
    }

    /// Whether the clip covers a timeline time (end exclusive)
    pub fn contains(&self, time_ms: f64) -> bool {
        time_ms >= self.start_ms && time_ms < self.end_ms()
    }

    /// Normalized offset of a timeline time within this clip
    pub fn local_offset(&self, time_ms: f64) -> f64 {
        if self.duration_ms <= 0.0 {
            return 0.0;
        }
        ((time_ms - self.start_ms) / self.duration_ms).clamp(0.0, 1.0)
    }

    /// Position in the source media for a timeline time
    pub fn media_time_ms(&self, time_ms: f64) -> f64 {
        time_ms - self.start_ms + self.trim_in_ms
    }

    fn overlaps(&self, other: &Clip) -> bool {
        self.start_ms < other.end_ms() && other.start_ms < self.end_ms()
    }

    /// Check timing, trim and keyframe invariants
    pub fn validate(&self) -> Result<()> {
        if !self.duration_ms.is_finite() || self.duration_ms <= 0.0 {
            return Err(TimelineError::InvalidDuration(self.duration_ms));
        }
        if !self.start_ms.is_finite() || self.start_ms < 0.0 {
            return Err(TimelineError::InvalidDuration(self.start_ms));
        }
        let trim_ok = self.trim_in_ms >= 0.0
            && self.trim_in_ms < self.trim_out_ms
            && self.trim_out_ms <= self.source_duration_ms;
        if !trim_ok {
            return Err(TimelineError::InvalidTrim {
                clip: self.id,
                trim_in_ms: self.trim_in_ms,
                trim_out_ms: self.trim_out_ms,
                source_duration_ms: self.source_duration_ms,
            });
        }
        for (property, keyframes) in &self.effect_params.keyframes {
            validate_keyframes(self.id, *property, keyframes)?;
        }
        Ok(())
    }
}

/// An ordered lane of clips
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Unique track ID
    pub id: TrackId,
    /// Track name
    pub name: String,
    /// Track type
    pub kind: TrackKind,
    /// Stacking order; higher draws on top
    pub z_order: i32,
    /// Whether the track's sound is muted
    #[serde(default)]
    pub muted: bool,
    /// Clips sorted by start time
    clips: Vec<Clip>,
}

impl Track {
    /// Create a new track
    pub fn new(name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: TrackId::new(),
            name: name.into(),
            kind,
            z_order: 0,
            muted: false,
            clips: Vec::new(),
        }
    }

    /// Set the stacking order
    pub fn with_z_order(mut self, z_order: i32) -> Self {
        self.z_order = z_order;
        self
    }

    /// Add a clip, rejecting overlaps with existing clips
    pub fn add_clip(&mut self, mut clip: Clip) -> Result<ClipId> {
        clip.track_id = self.id;
        clip.validate()?;
        if let Some(other) = self.clips.iter().find(|c| c.overlaps(&clip)) {
            return Err(TimelineError::ClipOverlap {
                track: self.id,
                clip: clip.id,
                other: other.id,
            });
        }
        let id = clip.id;
        let idx = self.clips.partition_point(|c| c.start_ms <= clip.start_ms);
        self.clips.insert(idx, clip);
        Ok(id)
    }

    /// Remove a clip
    pub fn remove_clip(&mut self, clip_id: ClipId) -> Option<Clip> {
        let idx = self.clips.iter().position(|c| c.id == clip_id)?;
        Some(self.clips.remove(idx))
    }

    /// Get clip by ID
    pub fn clip(&self, clip_id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == clip_id)
    }

    /// Get the clip covering a time
    pub fn clip_at(&self, time_ms: f64) -> Option<&Clip> {
        let idx = self.clips.partition_point(|c| c.start_ms <= time_ms);
        let candidate = self.clips.get(idx.checked_sub(1)?)?;
        candidate.contains(time_ms).then_some(candidate)
    }

    /// Get clips intersecting `[start_ms, end_ms]`
    pub fn clips_in_range(&self, start_ms: f64, end_ms: f64) -> Vec<&Clip> {
        self.clips
            .iter()
            .filter(|c| c.start_ms <= end_ms && c.end_ms() > start_ms)
            .collect()
    }

    /// Get all clips
    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    /// End of the last clip
    pub fn duration(&self) -> f64 {
        self.clips.last().map(Clip::end_ms).unwrap_or(0.0)
    }

    /// Check that clips are sorted, disjoint and individually valid
    pub fn validate(&self) -> Result<()> {
        for clip in &self.clips {
            if clip.track_id != self.id {
                return Err(TimelineError::ClipTrackMismatch {
                    clip: clip.id,
                    claimed: clip.track_id,
                    actual: self.id,
                });
            }
            clip.validate()?;
        }
        for pair in self.clips.windows(2) {
            if pair[0].overlaps(&pair[1]) || pair[1].start_ms < pair[0].start_ms {
                return Err(TimelineError::ClipOverlap {
                    track: self.id,
                    clip: pair[1].id,
                    other: pair[0].id,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyframe::Keyframe;

    #[test]
    fn test_add_clip_keeps_order() {
        let mut track = Track::new("V1", TrackKind::Video);
        let late = track.add_clip(Clip::new(track.id, "b.mp4", 3000.0, 1000.0)).unwrap();
        let early = track.add_clip(Clip::new(track.id, "a.mp4", 0.0, 1000.0)).unwrap();
        assert_eq!(track.clips()[0].id, early);
        assert_eq!(track.clips()[1].id, late);
        assert_eq!(track.duration(), 4000.0);
    }

    #[test]
    fn test_overlap_rejected() {
        let mut track = Track::new("V1", TrackKind::Video);
        track.add_clip(Clip::new(track.id, "a.mp4", 0.0, 1000.0)).unwrap();
        let err = track.add_clip(Clip::new(track.id, "b.mp4", 500.0, 1000.0));
        assert!(matches!(err, Err(TimelineError::ClipOverlap { .. })));

        // Touching clips do not overlap
        assert!(track.add_clip(Clip::new(track.id, "c.mp4", 1000.0, 1000.0)).is_ok());
    }

    #[test]
    fn test_clip_at_uses_half_open_ranges() {
        let mut track = Track::new("A1", TrackKind::Audio);
        let a = track.add_clip(Clip::new(track.id, "a.wav", 0.0, 1000.0)).unwrap();
        let b = track.add_clip(Clip::new(track.id, "b.wav", 1000.0, 1000.0)).unwrap();
        assert_eq!(track.clip_at(999.0).map(|c| c.id), Some(a));
        assert_eq!(track.clip_at(1000.0).map(|c| c.id), Some(b));
        assert!(track.clip_at(2000.0).is_none());
        assert!(track.clip_at(-1.0).is_none());
    }

    #[test]
    fn test_invalid_trim_rejected() {
        let track = Track::new("V1", TrackKind::Video);
        let clip = Clip::new(track.id, "a.mp4", 0.0, 1000.0).with_trim(500.0, 400.0, 2000.0);
        assert!(matches!(clip.validate(), Err(TimelineError::InvalidTrim { .. })));

        let clip = Clip::new(track.id, "a.mp4", 0.0, 1000.0).with_trim(0.0, 2500.0, 2000.0);
        assert!(clip.validate().is_err());
    }

    #[test]
    fn test_media_time_applies_trim() {
        let track = Track::new("V1", TrackKind::Video);
        let clip = Clip::new(track.id, "a.mp4", 2000.0, 1000.0).with_trim(500.0, 1500.0, 4000.0);
        assert_eq!(clip.media_time_ms(2250.0), 750.0);
        assert_eq!(clip.local_offset(2500.0), 0.5);
    }

    #[test]
    fn test_bad_keyframes_rejected_on_add() {
        let mut track = Track::new("V1", TrackKind::Video);
        let clip = Clip::new(track.id, "a.mp4", 0.0, 1000.0).with_keyframes(
            AnimatableProperty::Opacity,
            vec![Keyframe::new(0.3, 1.0), Keyframe::new(0.3, 0.0)],
        );
        assert!(matches!(
            track.add_clip(clip),
            Err(TimelineError::InvalidKeyframeData { .. })
        ));
        assert!(track.clips().is_empty());
    }
}
