// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-frame output for the render surface.

use crate::media::MediaPosition;
use clipforge_timeline::{ClipId, TimelineSnapshot, TrackId, Transform};

/// A clip visible in a frame
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveClip {
    /// Clip ID
    pub clip_id: ClipId,
    /// Owning track
    pub track_id: TrackId,
    /// Stacking order, higher draws on top
    pub z_order: i32,
    /// Interpolated transform
    pub transform: Transform,
    /// Source time to show (`None` for clips without media)
    pub media_time_ms: Option<f64>,
    /// Whether the clip is holding its last good frame
    pub degraded: bool,
}

/// What to draw at a timeline time
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameState {
    /// Timeline time of the frame
    pub time_ms: f64,
    /// Visible clips, bottom to top
    pub active_clips: Vec<ActiveClip>,
}

impl FrameState {
    /// Compose a frame, asking `position` where live media elements are
    pub fn compose(
        timeline: &TimelineSnapshot,
        time_ms: f64,
        position: impl Fn(ClipId) -> Option<MediaPosition>,
    ) -> Self {
        let mut active_clips: Vec<ActiveClip> = timeline
            .active_clips(time_ms)
            .map(|clip| {
                let (media_time_ms, degraded) = if clip.has_media_element() {
                    match position(clip.id) {
                        Some(live) => (Some(live.time_ms), live.degraded),
                        None => (Some(clip.media_time_ms(time_ms)), false),
                    }
                } else {
                    (None, false)
                };
                ActiveClip {
                    clip_id: clip.id,
                    track_id: clip.track_id,
                    z_order: clip.z_order,
                    transform: clip.transform_at(time_ms),
                    media_time_ms,
                    degraded,
                }
            })
            .collect();
        active_clips.sort_by_key(|c| c.z_order);

        Self { time_ms, active_clips }
    }

    /// Get a visible clip
    pub fn clip(&self, clip_id: ClipId) -> Option<&ActiveClip> {
        self.active_clips.iter().find(|c| c.clip_id == clip_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_timeline::{AnimatableProperty, Clip, CompoundValue, Easing, Keyframe, Timeline, Track, TrackKind};

    #[test]
    fn test_compose_orders_by_z_and_interpolates() {
        let mut timeline = Timeline::new("Frame", 10_000.0);
        let top = timeline.add_track(Track::new("Titles", TrackKind::Text).with_z_order(5));
        let base = timeline.add_track(Track::new("V1", TrackKind::Video).with_z_order(0));
        let title = timeline
            .add_clip(
                top,
                Clip::new(top, "title", 0.0, 2000.0).with_keyframes(
                    AnimatableProperty::Position,
                    vec![
                        Keyframe::new(0.0, CompoundValue::new(0.0, 0.0)).with_easing(Easing::EaseIn),
                        Keyframe::new(1.0, CompoundValue::new(100.0, 50.0)),
                    ],
                ),
            )
            .unwrap();
        let video = timeline
            .add_clip(
                base,
                Clip::new(base, "v.mp4", 0.0, 2000.0).with_keyframes(
                    AnimatableProperty::Scale,
                    vec![Keyframe::new(0.0, 1.0), Keyframe::new(1.0, 2.0)],
                ),
            )
            .unwrap();
        let snapshot = timeline.compile().unwrap();

        let frame = FrameState::compose(&snapshot, 1000.0, |_| None);
        assert_eq!(frame.active_clips.len(), 2);
        assert_eq!(frame.active_clips[0].clip_id, video);
        assert_eq!(frame.active_clips[1].clip_id, title);

        let video_state = frame.clip(video).unwrap();
        assert_eq!(video_state.transform.scale, CompoundValue::new(1.5, 1.5));
        assert_eq!(video_state.media_time_ms, Some(1000.0));

        let title_state = frame.clip(title).unwrap();
        assert_eq!(title_state.transform.position, CompoundValue::new(25.0, 12.5));
        assert_eq!(title_state.media_time_ms, None);
    }

    #[test]
    fn test_compose_reports_degraded_media() {
        let mut timeline = Timeline::new("Frame", 10_000.0);
        let track = timeline.add_track(Track::new("V1", TrackKind::Video));
        let clip = timeline
            .add_clip(track, Clip::new(track, "v.mp4", 0.0, 2000.0))
            .unwrap();
        let snapshot = timeline.compile().unwrap();

        let frame = FrameState::compose(&snapshot, 1500.0, |_| {
            Some(MediaPosition {
                time_ms: 320.0,
                degraded: true,
            })
        });
        let state = frame.clip(clip).unwrap();
        assert_eq!(state.media_time_ms, Some(320.0));
        assert!(state.degraded);
        assert!(FrameState::compose(&snapshot, 2000.0, |_| None).active_clips.is_empty());
    }
}
