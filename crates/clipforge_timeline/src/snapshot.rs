// SPDX-License-Identifier: MIT OR Apache-2.0
//! Immutable, playback-ready view of a timeline.
//!
//! Compiling resolves every keyframe list into a typed [`Channel`] once, so
//! per-frame evaluation never branches on value shape.

use crate::channel::{Channel, ChannelKey, Interpolate};
use crate::keyframe::{AnimatableProperty, CompoundValue, Keyframe, KeyframeValue};
use crate::timeline::{Timeline, TimelineId};
use crate::track::{Clip, ClipId, TrackId, TrackKind};
use std::collections::HashMap;

/// Geometric state of a clip at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Canvas offset
    pub position: CompoundValue,
    /// Effective scale (uniform times per-axis)
    pub scale: CompoundValue,
    /// Rotation in degrees
    pub rotation: f64,
    /// Opacity in `[0,1]`
    pub opacity: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: CompoundValue::splat(0.0),
            scale: CompoundValue::splat(1.0),
            rotation: 0.0,
            opacity: 1.0,
        }
    }
}

/// Typed channels for every animatable property of a clip
#[derive(Debug, Clone, PartialEq)]
pub struct ClipChannels {
    /// Position channel
    pub position: Channel<CompoundValue>,
    /// Uniform scale channel
    pub scale: Channel<f64>,
    /// Per-axis scale channel
    pub scale_xy: Channel<CompoundValue>,
    /// Rotation channel
    pub rotation: Channel<f64>,
    /// Opacity channel
    pub opacity: Channel<f64>,
    /// Volume channel
    pub volume: Channel<f64>,
}

impl ClipChannels {
    fn resolve(clip: &Clip) -> Self {
        let keys = |p: AnimatableProperty| keyframes_of(clip, p);
        Self {
            position: compound_channel(keys(AnimatableProperty::Position), AnimatableProperty::Position),
            scale: scalar_channel(keys(AnimatableProperty::Scale), AnimatableProperty::Scale),
            scale_xy: compound_channel(keys(AnimatableProperty::ScaleXY), AnimatableProperty::ScaleXY),
            rotation: scalar_channel(keys(AnimatableProperty::Rotation), AnimatableProperty::Rotation),
            opacity: scalar_channel(keys(AnimatableProperty::Opacity), AnimatableProperty::Opacity),
            volume: scalar_channel(keys(AnimatableProperty::Volume), AnimatableProperty::Volume),
        }
    }
}

fn keyframes_of(clip: &Clip, property: AnimatableProperty) -> &[Keyframe] {
    clip.effect_params
        .keyframes
        .get(&property)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn build_channel<T: Interpolate>(
    keyframes: &[Keyframe],
    default: T,
    extract: impl Fn(&KeyframeValue) -> Option<T>,
) -> Channel<T> {
    let keys = keyframes
        .iter()
        .filter_map(|kf| {
            extract(&kf.value).map(|value| ChannelKey {
                offset: kf.offset,
                value,
                easing: kf.easing,
            })
        })
        .collect();
    Channel::new(keys, default)
}

fn scalar_channel(keyframes: &[Keyframe], property: AnimatableProperty) -> Channel<f64> {
    let default = property.default_value().as_scalar().unwrap_or(0.0);
    build_channel(keyframes, default, KeyframeValue::as_scalar)
}

fn compound_channel(keyframes: &[Keyframe], property: AnimatableProperty) -> Channel<CompoundValue> {
    let default = property.default_value().as_compound().unwrap_or_default();
    build_channel(keyframes, default, KeyframeValue::as_compound)
}

/// A clip resolved for playback
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledClip {
    /// Clip ID
    pub id: ClipId,
    /// Owning track
    pub track_id: TrackId,
    /// Owning track's kind
    pub track_kind: TrackKind,
    /// Owning track's stacking order
    pub z_order: i32,
    /// Owning track's mute flag
    pub track_muted: bool,
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
    /// Resolved property channels
    pub channels: ClipChannels,
}

impl CompiledClip {
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
        ((time_ms - self.start_ms) / self.duration_ms).clamp(0.0, 1.0)
    }

    /// Position in the source media for a timeline time, kept inside the trim
    pub fn media_time_ms(&self, time_ms: f64) -> f64 {
        (time_ms - self.start_ms + self.trim_in_ms).clamp(self.trim_in_ms, self.trim_out_ms)
    }

    /// Whether this clip plays through a media element
    pub fn has_media_element(&self) -> bool {
        self.track_kind.has_media_element()
    }

    /// Whether this clip should be heard
    pub fn is_audible(&self) -> bool {
        self.track_kind.is_audio_bearing() && !self.track_muted
    }

    /// Evaluate the geometric transform at a timeline time
    pub fn transform_at(&self, time_ms: f64) -> Transform {
        let offset = self.local_offset(time_ms);
        let uniform = self.channels.scale.evaluate(offset);
        let per_axis = self.channels.scale_xy.evaluate(offset);
        Transform {
            position: self.channels.position.evaluate(offset),
            scale: CompoundValue::new(per_axis.x * uniform, per_axis.y * uniform),
            rotation: self.channels.rotation.evaluate(offset),
            opacity: self.channels.opacity.evaluate(offset).clamp(0.0, 1.0),
        }
    }

    /// Evaluate the volume at a timeline time
    pub fn volume_at(&self, time_ms: f64) -> f64 {
        self.channels.volume.evaluate(self.local_offset(time_ms)).max(0.0)
    }
}

/// Read-only timeline state consumed by the playback engine
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineSnapshot {
    /// Source timeline ID
    pub id: TimelineId,
    /// Declared timeline length
    pub duration_ms: f64,
    /// Frame rate
    pub frame_rate: f64,
    /// All clips sorted by start time
    clips: Vec<CompiledClip>,
    index: HashMap<ClipId, usize>,
}

impl TimelineSnapshot {
    /// Build from an already validated timeline
    pub(crate) fn build(timeline: &Timeline) -> Self {
        let mut clips: Vec<CompiledClip> = timeline
            .tracks()
            .flat_map(|track| {
                track.clips().iter().map(move |clip| CompiledClip {
                    id: clip.id,
                    track_id: track.id,
                    track_kind: track.kind,
                    z_order: track.z_order,
                    track_muted: track.muted,
                    source_url: clip.source_url.clone(),
                    start_ms: clip.start_ms,
                    duration_ms: clip.duration_ms,
                    trim_in_ms: clip.trim_in_ms,
                    trim_out_ms: clip.trim_out_ms,
                    channels: ClipChannels::resolve(clip),
                })
            })
            .collect();
        clips.sort_by(|a, b| a.start_ms.total_cmp(&b.start_ms));
        let index = clips.iter().enumerate().map(|(i, c)| (c.id, i)).collect();

        Self {
            id: timeline.id,
            duration_ms: timeline.duration_ms,
            frame_rate: timeline.frame_rate,
            clips,
            index,
        }
    }

    /// Snapshot with no clips
    pub fn empty(duration_ms: f64) -> Self {
        Self {
            id: TimelineId::new(),
            duration_ms,
            frame_rate: 30.0,
            clips: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Get clip by ID
    pub fn clip(&self, clip_id: ClipId) -> Option<&CompiledClip> {
        self.index.get(&clip_id).and_then(|&i| self.clips.get(i))
    }

    /// Get all clips sorted by start
    pub fn clips(&self) -> &[CompiledClip] {
        &self.clips
    }

    /// Clips covering a timeline time
    pub fn active_clips(&self, time_ms: f64) -> impl Iterator<Item = &CompiledClip> {
        let end = self.clips.partition_point(|c| c.start_ms <= time_ms);
        self.clips[..end].iter().filter(move |c| c.contains(time_ms))
    }

    /// Clips that start in `(time_ms, time_ms + window_ms]`
    pub fn clips_starting_within(
        &self,
        time_ms: f64,
        window_ms: f64,
    ) -> impl Iterator<Item = &CompiledClip> {
        let begin = self.clips.partition_point(|c| c.start_ms <= time_ms);
        let end = self.clips.partition_point(|c| c.start_ms <= time_ms + window_ms);
        self.clips[begin..end.max(begin)].iter()
    }

    /// Clips intersecting `[start_ms, end_ms]`
    pub fn clips_overlapping(
        &self,
        start_ms: f64,
        end_ms: f64,
    ) -> impl Iterator<Item = &CompiledClip> {
        let end = self.clips.partition_point(|c| c.start_ms <= end_ms);
        self.clips[..end].iter().filter(move |c| c.end_ms() > start_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::easing::Easing;
    use crate::track::Track;

    fn two_clip_timeline() -> (Timeline, ClipId, ClipId) {
        let mut timeline = Timeline::new("Edit", 10_000.0);
        let video = timeline.add_track(Track::new("V1", TrackKind::Video).with_z_order(1));
        let a = timeline
            .add_clip(
                video,
                Clip::new(video, "a.mp4", 0.0, 2000.0).with_keyframes(
                    AnimatableProperty::Scale,
                    vec![Keyframe::new(0.0, 1.0), Keyframe::new(1.0, 2.0)],
                ),
            )
            .unwrap();
        let b = timeline
            .add_clip(
                video,
                Clip::new(video, "b.mp4", 2000.0, 2000.0).with_keyframes(
                    AnimatableProperty::Position,
                    vec![
                        Keyframe::new(0.0, CompoundValue::new(0.0, 0.0)).with_easing(Easing::EaseIn),
                        Keyframe::new(1.0, CompoundValue::new(100.0, 50.0)),
                    ],
                ),
            )
            .unwrap();
        (timeline, a, b)
    }

    #[test]
    fn test_transform_from_scalar_scale() {
        let (timeline, a, _) = two_clip_timeline();
        let snapshot = timeline.compile().unwrap();
        let clip = snapshot.clip(a).unwrap();
        let transform = clip.transform_at(1000.0);
        assert_eq!(transform.scale, CompoundValue::splat(1.5));
        assert_eq!(transform.opacity, 1.0);
    }

    #[test]
    fn test_transform_from_compound_position() {
        let (timeline, _, b) = two_clip_timeline();
        let snapshot = timeline.compile().unwrap();
        let clip = snapshot.clip(b).unwrap();
        assert_eq!(clip.transform_at(3000.0).position, CompoundValue::new(25.0, 12.5));
    }

    #[test]
    fn test_active_and_upcoming_queries() {
        let (timeline, a, b) = two_clip_timeline();
        let snapshot = timeline.compile().unwrap();

        let active: Vec<_> = snapshot.active_clips(1999.0).map(|c| c.id).collect();
        assert_eq!(active, vec![a]);
        let active: Vec<_> = snapshot.active_clips(2000.0).map(|c| c.id).collect();
        assert_eq!(active, vec![b]);

        let upcoming: Vec<_> = snapshot.clips_starting_within(1600.0, 500.0).map(|c| c.id).collect();
        assert_eq!(upcoming, vec![b]);
        assert_eq!(snapshot.clips_starting_within(1000.0, 500.0).count(), 0);

        assert_eq!(snapshot.clips_overlapping(1500.0, 6500.0).count(), 2);
        assert_eq!(snapshot.clips_overlapping(4000.0, 6500.0).count(), 0);
    }

    #[test]
    fn test_media_time_clamped_to_trim() {
        let mut timeline = Timeline::new("Edit", 10_000.0);
        let audio = timeline.add_track(Track::new("A1", TrackKind::Audio));
        let id = timeline
            .add_clip(
                audio,
                Clip::new(audio, "a.wav", 1000.0, 1000.0).with_trim(500.0, 1500.0, 3000.0),
            )
            .unwrap();
        let snapshot = timeline.compile().unwrap();
        let clip = snapshot.clip(id).unwrap();
        assert_eq!(clip.media_time_ms(1250.0), 750.0);
        assert_eq!(clip.media_time_ms(500.0), 500.0);
        assert_eq!(clip.media_time_ms(9000.0), 1500.0);
    }
}
