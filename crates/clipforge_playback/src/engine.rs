// SPDX-License-Identifier: MIT OR Apache-2.0
//! Playback engine.
//!
//! Owns the clock, the sync manager, the buffer and the prefetch planner,
//! and runs them in a fixed order once per [`tick`](PlaybackEngine::tick).
//! Within a tick the playhead never moves after the clock step, so every
//! consumer sees the same time. The frame timestamps handed to `tick` are
//! the engine's only notion of time.

use crate::cache::{BufferEvent, BufferManager, BufferState, BufferStats, SubscriptionId};
use crate::clock::{ClockEvent, PlaybackClock, PlaybackState, PlaybackStatus};
use crate::config::EngineConfig;
use crate::error::{PlaybackError, PlaybackWarning, Result};
use crate::fetch::MediaFetcher;
use crate::frame::FrameState;
use crate::media::MediaBackend;
use crate::planner::PrefetchPlanner;
use crate::sync::{SyncContext, SyncManager};
use clipforge_timeline::TimelineSnapshot;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Playback engine context
pub struct PlaybackEngine {
    config: EngineConfig,
    clock: PlaybackClock,
    sync: SyncManager,
    cache: BufferManager,
    planner: PrefetchPlanner,
    timeline_rx: watch::Receiver<Arc<TimelineSnapshot>>,
    snapshot: Arc<TimelineSnapshot>,
    warnings: Vec<PlaybackWarning>,
}

impl PlaybackEngine {
    /// Create a new engine
    ///
    /// Fetches are spawned on `runtime`; elements come from `backend`.
    pub fn new(
        config: EngineConfig,
        mut timeline_rx: watch::Receiver<Arc<TimelineSnapshot>>,
        fetcher: Arc<dyn MediaFetcher>,
        backend: Box<dyn MediaBackend>,
        runtime: Handle,
    ) -> Result<Self> {
        config.validate()?;
        let snapshot = timeline_rx.borrow_and_update().clone();
        tracing::info!(
            "Playback engine ready: {} clips, {:.0}ms",
            snapshot.clips().len(),
            snapshot.duration_ms
        );

        Ok(Self {
            clock: PlaybackClock::new(snapshot.duration_ms),
            sync: SyncManager::new(backend),
            cache: BufferManager::new(config.clone(), fetcher, runtime),
            planner: PrefetchPlanner::new(),
            timeline_rx,
            snapshot,
            config,
            warnings: Vec::new(),
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Snapshot currently being played
    pub fn timeline(&self) -> &Arc<TimelineSnapshot> {
        &self.snapshot
    }

    /// Start or resume playback
    ///
    /// Starting from idle or paused begins a new play session, giving
    /// clips that failed earlier another chance.
    pub fn play(&mut self) {
        let resuming = matches!(self.clock.status(), PlaybackStatus::Idle | PlaybackStatus::Paused);
        if self.clock.play() {
            if resuming {
                self.sync.begin_session();
            }
            tracing::info!("Playback started at {:.1}ms", self.clock.current_ms());
        }
    }

    /// Pause playback; buffering continues
    pub fn pause(&mut self) {
        if self.clock.pause() {
            tracing::info!("Playback paused at {:.1}ms", self.clock.current_ms());
            self.sync.pause_all();
        }
    }

    /// Jump to a timeline time; returns the clamped target
    pub fn seek(&mut self, time_ms: f64) -> f64 {
        let target = self.clock.seek(time_ms);
        tracing::debug!("Seeking to {:.1}ms", target);

        // Drop stale buffering first so the new window gets the slots
        let refused = self
            .planner
            .plan(target, self.config.lookahead_ms, &self.snapshot, &mut self.cache);
        self.record_refusals(refused);

        let ctx = SyncContext {
            time_ms: target,
            playing: false,
            rate: self.clock.rate(),
            now_ms: self.clock.last_frame_ms().unwrap_or_default(),
            timeline: &self.snapshot,
            cache: &self.cache,
            config: &self.config,
        };
        self.sync.seek(&ctx);
        target
    }

    /// Change the playback speed
    pub fn set_rate(&mut self, rate: f64) -> Result<()> {
        self.clock.set_rate(rate)?;
        tracing::debug!("Playback rate set to {}", rate);
        Ok(())
    }

    /// Stop and rewind
    pub fn stop(&mut self) {
        self.clock.stop();
        self.sync.clear();
        tracing::info!("Playback stopped");
    }

    /// Current playback state
    pub fn playback_state(&self) -> PlaybackState {
        self.clock.state()
    }

    /// What to draw at `time_ms`
    pub fn frame_state(&self, time_ms: f64) -> FrameState {
        let live = time_ms == self.clock.current_ms();
        FrameState::compose(&self.snapshot, time_ms, |clip| {
            if live {
                self.sync.media_position(clip)
            } else {
                None
            }
        })
    }

    /// Follow buffering progress of a source
    pub fn subscribe_buffer_progress(
        &mut self,
        url: &str,
        callback: impl FnMut(&BufferEvent) + 'static,
    ) -> SubscriptionId {
        self.cache.subscribe(url, callback)
    }

    /// Stop following a source
    pub fn unsubscribe_buffer_progress(&mut self, id: SubscriptionId) -> bool {
        self.cache.unsubscribe(id)
    }

    /// Buffer state of a source
    pub fn buffer_state(&self, url: &str) -> Option<BufferState> {
        self.cache.state(url)
    }

    /// Aggregate buffer state
    pub fn buffer_stats(&self) -> BufferStats {
        self.cache.stats()
    }

    /// Drain non-fatal problems observed since the last call
    pub fn take_warnings(&mut self) -> Vec<PlaybackWarning> {
        self.warnings.append(&mut self.sync.take_warnings());
        std::mem::take(&mut self.warnings)
    }

    /// Advance one animation frame
    pub fn tick(&mut self, frame_ts_ms: f64) -> PlaybackState {
        self.adopt_timeline();
        self.cache.pump();

        if self.clock.tick(frame_ts_ms) == ClockEvent::ReachedEnd {
            tracing::info!("Reached end of timeline at {:.1}ms", self.clock.current_ms());
            self.sync.pause_all();
        }

        if self.clock.status() == PlaybackStatus::Seeking {
            self.resolve_seek(frame_ts_ms);
        }

        let time_ms = self.clock.current_ms();
        let refused = self
            .planner
            .plan(time_ms, self.config.lookahead_ms, &self.snapshot, &mut self.cache);
        self.record_refusals(refused);

        let ctx = SyncContext {
            time_ms,
            playing: self.clock.is_playing(),
            rate: self.clock.rate(),
            now_ms: frame_ts_ms,
            timeline: &self.snapshot,
            cache: &self.cache,
            config: &self.config,
        };
        self.sync.tick(&ctx);

        self.clock.state()
    }

    fn adopt_timeline(&mut self) {
        if let Ok(true) = self.timeline_rx.has_changed() {
            let snapshot = self.timeline_rx.borrow_and_update().clone();
            tracing::info!(
                "Timeline updated: {} clips, {:.0}ms",
                snapshot.clips().len(),
                snapshot.duration_ms
            );
            self.clock.set_duration(snapshot.duration_ms);
            self.snapshot = snapshot;
        }
    }

    fn resolve_seek(&mut self, now_ms: f64) {
        if self.sync.is_ready() {
            if let Some(status) = self.clock.finish_seek() {
                tracing::debug!("Seek settled at {:.1}ms, resuming {:?}", self.clock.current_ms(), status);
            }
            return;
        }

        let Some(waited_ms) = self.clock.seek_elapsed_ms(now_ms) else {
            return;
        };
        if waited_ms < self.config.seek_timeout_ms {
            return;
        }

        let target_ms = self.clock.current_ms();
        tracing::warn!("Seek to {:.1}ms timed out after {:.0}ms", target_ms, waited_ms);
        self.warnings.push(PlaybackWarning::SeekTimeout { target_ms, waited_ms });
        self.sync.mark_unready_unavailable("not ready when seek timed out");
        self.clock.finish_seek();
    }

    fn record_refusals(&mut self, refused: Vec<PlaybackError>) {
        for err in refused {
            if let PlaybackError::BufferCapacityExceeded { url } = err {
                self.warnings.push(PlaybackWarning::CapacityExceeded { url });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::TimelineFeed;
    use crate::retry::RetryPolicy;
    use crate::testing::{settle, ManualFetcher, TestBackend};
    use clipforge_timeline::{Clip, ClipId, Timeline, Track, TrackKind};
    use parking_lot::Mutex;
    use std::rc::Rc;

    struct Harness {
        engine: PlaybackEngine,
        feed: TimelineFeed,
        fetcher: ManualFetcher,
        backend: TestBackend,
    }

    impl Harness {
        fn new(timeline: &Timeline) -> Self {
            let config = EngineConfig {
                retry: RetryPolicy::none(),
                ..EngineConfig::default()
            };
            let feed = TimelineFeed::new(timeline).unwrap();
            let fetcher = ManualFetcher::new();
            let backend = TestBackend::new();
            let engine = PlaybackEngine::new(
                config,
                feed.subscribe(),
                Arc::new(fetcher.clone()),
                Box::new(backend.clone()),
                Handle::current(),
            )
            .unwrap();
            Self {
                engine,
                feed,
                fetcher,
                backend,
            }
        }

        fn tick(&mut self, ts: f64) -> PlaybackState {
            self.engine.tick(ts)
        }

        async fn deliver(&mut self, url: &str) {
            settle(&mut self.engine.cache).await;
            self.fetcher.complete(url, Ok(Arc::from(vec![0u8; 32])));
            settle(&mut self.engine.cache).await;
        }
    }

    fn back_to_back() -> (Timeline, ClipId, ClipId) {
        let mut timeline = Timeline::new("Cut", 10_000.0);
        let track = timeline.add_track(Track::new("V1", TrackKind::Video));
        let a = timeline
            .add_clip(track, Clip::new(track, "a.mp4", 0.0, 2000.0))
            .unwrap();
        let b = timeline
            .add_clip(track, Clip::new(track, "b.mp4", 2000.0, 2000.0))
            .unwrap();
        (timeline, a, b)
    }

    #[tokio::test]
    async fn test_clock_follows_frame_timestamps() {
        let mut h = Harness::new(&Timeline::new("Empty", 10_000.0));
        h.tick(0.0);
        h.engine.play();
        h.tick(16.0);
        h.tick(32.0);
        let state = h.tick(49.0);
        assert_eq!(state.current_ms, 49.0);
        assert_eq!(state.status, PlaybackStatus::Playing);
    }

    #[tokio::test]
    async fn test_large_frame_timestamps_are_the_time_base() {
        let (timeline, _, _) = back_to_back();
        let mut h = Harness::new(&timeline);
        h.tick(120_000.0);
        h.engine.play();
        let state = h.tick(120_016.0);
        assert_eq!(state.status, PlaybackStatus::Playing);
        assert_eq!(state.current_ms, 16.0);

        h.engine.seek(3000.0);
        let state = h.tick(120_032.0);
        assert_eq!(state.status, PlaybackStatus::Seeking);
        assert!(h.engine.take_warnings().is_empty());

        h.deliver("b.mp4").await;
        h.tick(120_048.0);
        let state = h.tick(120_064.0);
        assert_eq!(state.status, PlaybackStatus::Playing);
        assert_eq!(state.current_ms, 3000.0);
        let state = h.tick(120_080.0);
        assert_eq!(state.current_ms, 3016.0);
        assert!(h.engine.take_warnings().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_seek_is_idempotent() {
        let (timeline, _, _) = back_to_back();
        let mut h = Harness::new(&timeline);
        h.engine.seek(1234.0);
        let first = h.engine.playback_state();
        h.engine.seek(1234.0);
        assert_eq!(h.engine.playback_state(), first);
        assert_eq!(first.status, PlaybackStatus::Seeking);
        assert_eq!(first.seek_target_ms, Some(1234.0));
    }

    #[tokio::test]
    async fn test_seek_near_boundary_pre_arms_next_clip() {
        let (timeline, a, b) = back_to_back();
        let mut h = Harness::new(&timeline);

        h.engine.seek(1800.0);
        h.deliver("a.mp4").await;
        h.deliver("b.mp4").await;

        h.tick(16.0);
        let state = h.tick(32.0);
        assert_eq!(state.status, PlaybackStatus::Paused);
        assert_eq!(state.current_ms, 1800.0);

        let armed = h.backend.element(b).unwrap();
        assert!(armed.paused);
        assert_eq!(armed.seeks, vec![0.0]);

        h.engine.play();
        h.tick(100.0);
        h.backend.advance_playing(100.0);
        h.tick(200.0);
        h.backend.advance_playing(32.0);
        let state = h.tick(232.0);
        assert_eq!(state.current_ms, 2000.0);

        let frame = h.engine.frame_state(2000.0);
        assert_eq!(frame.active_clips.len(), 1);
        let next = frame.clip(b).unwrap();
        assert_eq!(next.media_time_ms, Some(0.0));
        assert!(!next.degraded);
        assert!(frame.clip(a).is_none());

        let element = h.backend.element(b).unwrap();
        assert!(!element.paused);
        assert_eq!(element.seeks, vec![0.0]);
        assert_eq!(h.backend.created_count(b), 1);
    }

    #[tokio::test]
    async fn test_seek_timeout_degrades_and_warns() {
        let (timeline, a, _) = back_to_back();
        let mut h = Harness::new(&timeline);
        h.tick(0.0);
        h.engine.seek(500.0);

        h.tick(1000.0);
        assert_eq!(h.engine.playback_state().status, PlaybackStatus::Seeking);

        let state = h.tick(2500.0);
        assert_eq!(state.status, PlaybackStatus::Paused);

        let warnings = h.engine.take_warnings();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, PlaybackWarning::SeekTimeout { target_ms, .. } if *target_ms == 500.0)));
        assert!(warnings
            .iter()
            .any(|w| matches!(w, PlaybackWarning::MediaLoad { clip, .. } if *clip == a)));
        assert!(h.engine.frame_state(500.0).clip(a).unwrap().degraded);
    }

    #[tokio::test]
    async fn test_seek_timeout_while_playing_holds_degraded_clip() {
        let (timeline, a, _) = back_to_back();
        let mut h = Harness::new(&timeline);
        h.engine.play();
        h.tick(0.0);
        h.engine.seek(500.0);
        h.tick(1000.0);

        let state = h.tick(2500.0);
        assert_eq!(state.status, PlaybackStatus::Playing);
        assert_eq!(h.engine.take_warnings().len(), 2);
        let held = h.engine.frame_state(500.0);
        assert!(held.clip(a).unwrap().degraded);
        assert!(h.backend.element(a).unwrap().paused);

        // Stays unavailable for the rest of the session, warned once
        h.tick(2600.0);
        let state = h.tick(3400.0);
        assert_eq!(state.current_ms, 1400.0);
        assert!(h.engine.frame_state(1400.0).clip(a).unwrap().degraded);
        assert!(h.engine.take_warnings().is_empty());

        // A new play session retries the clip
        h.engine.pause();
        h.deliver("a.mp4").await;
        h.engine.play();
        let state = h.tick(3500.0);
        assert_eq!(state.current_ms, 1500.0);
        let clip = h.engine.frame_state(1500.0).clip(a).cloned().unwrap();
        assert!(!clip.degraded);
        assert_eq!(clip.media_time_ms, Some(1500.0));
    }

    #[tokio::test]
    async fn test_failed_media_degrades_without_stopping() {
        let (timeline, a, _) = back_to_back();
        let mut h = Harness::new(&timeline);
        h.engine.play();
        h.tick(0.0);
        settle(&mut h.engine.cache).await;
        h.fetcher.complete("a.mp4", Err(crate::error::FetchError::Status(404)));
        settle(&mut h.engine.cache).await;

        let state = h.tick(100.0);
        assert_eq!(state.status, PlaybackStatus::Playing);
        assert_eq!(h.engine.buffer_state("a.mp4"), Some(BufferState::Failed));
        assert!(h.engine.frame_state(100.0).clip(a).unwrap().degraded);
        assert_eq!(h.engine.take_warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_reaching_end_goes_idle_and_pauses_media() {
        let (timeline, _, b) = back_to_back();
        let mut h = Harness::new(&timeline);
        h.engine.seek(3900.0);
        h.deliver("b.mp4").await;
        h.tick(10.0);
        h.tick(20.0);
        h.engine.play();
        h.tick(50.0);
        assert!(!h.backend.element(b).unwrap().paused);

        let mut shorter = timeline.clone();
        shorter.duration_ms = 4000.0;
        h.feed.publish(&shorter).unwrap();
        let state = h.tick(200.0);
        assert_eq!(state.status, PlaybackStatus::Idle);
        assert_eq!(state.current_ms, 4000.0);
        assert!(h.backend.element(b).unwrap().paused);
    }

    #[tokio::test]
    async fn test_buffer_progress_subscription() {
        let (timeline, _, _) = back_to_back();
        let mut h = Harness::new(&timeline);
        let events = Rc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        h.engine
            .subscribe_buffer_progress("a.mp4", move |e| sink.lock().push(e.clone()));

        h.tick(0.0);
        h.deliver("a.mp4").await;
        assert_eq!(h.engine.buffer_state("a.mp4"), Some(BufferState::Ready));
        assert!(matches!(events.lock().last(), Some(BufferEvent::Ready { .. })));

        // Pausing keeps prefetching
        h.engine.play();
        h.tick(10.0);
        h.engine.pause();
        h.tick(20.0);
        assert!(h.engine.buffer_state("b.mp4").is_some());
        assert!(h.engine.buffer_stats().entries >= 2);
    }

    #[tokio::test]
    async fn test_rate_change_validated() {
        let mut h = Harness::new(&Timeline::new("Empty", 10_000.0));
        assert!(h.engine.set_rate(0.0).is_err());
        h.engine.set_rate(2.0).unwrap();
        h.engine.play();
        let state = h.tick(100.0);
        assert_eq!(state.current_ms, 200.0);
        assert_eq!(state.rate, 2.0);
    }
}
