// SPDX-License-Identifier: MIT OR Apache-2.0
//! Simulated media elements for headless playback.
//!
//! Elements run on their own wall clock with an optional skew, so the
//! engine's drift correction has something to correct.

use clipforge_playback::{MediaBackend, MediaBytes, MediaElement};
use clipforge_timeline::CompiledClip;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// Counters shared by a backend and its elements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    /// Elements created
    pub elements_created: usize,
    /// Seeks issued to any element
    pub seeks: usize,
    /// Media payloads loaded
    pub loads: usize,
}

/// Backend producing [`SimulatedElement`]s
#[derive(Debug, Clone, Default)]
pub struct SimulatedBackend {
    skew: f64,
    stats: Arc<Mutex<SimStats>>,
}

impl SimulatedBackend {
    /// Create a backend whose elements run `skew` fast (or slow when negative)
    pub fn new(skew: f64) -> Self {
        Self {
            skew,
            stats: Arc::default(),
        }
    }

    /// Counters so far
    pub fn stats(&self) -> SimStats {
        *self.stats.lock()
    }
}

impl MediaBackend for SimulatedBackend {
    fn create_element(&self, clip: &CompiledClip) -> Box<dyn MediaElement> {
        self.stats.lock().elements_created += 1;
        tracing::debug!("Creating element for {}", clip.source_url);
        Box::new(SimulatedElement::new(self.skew, self.stats.clone()))
    }
}

/// A media element that plays nothing but keeps time
#[derive(Debug)]
pub struct SimulatedElement {
    anchor_media_ms: f64,
    anchor: Instant,
    paused: bool,
    rate: f64,
    skew: f64,
    muted: bool,
    volume: f64,
    ready: bool,
    error: Option<String>,
    stats: Arc<Mutex<SimStats>>,
}

impl SimulatedElement {
    fn new(skew: f64, stats: Arc<Mutex<SimStats>>) -> Self {
        Self {
            anchor_media_ms: 0.0,
            anchor: Instant::now(),
            paused: true,
            rate: 1.0,
            skew,
            muted: false,
            volume: 1.0,
            ready: false,
            error: None,
            stats,
        }
    }

    fn rebase(&mut self) {
        self.anchor_media_ms = self.current_time_ms();
        self.anchor = Instant::now();
    }
}

impl MediaElement for SimulatedElement {
    fn current_time_ms(&self) -> f64 {
        if self.paused {
            return self.anchor_media_ms;
        }
        let elapsed = self.anchor.elapsed().as_secs_f64() * 1000.0;
        self.anchor_media_ms + elapsed * self.rate * (1.0 + self.skew)
    }

    fn seek(&mut self, media_ms: f64) {
        self.anchor_media_ms = media_ms.max(0.0);
        self.anchor = Instant::now();
        self.stats.lock().seeks += 1;
    }

    fn play(&mut self) {
        if self.paused {
            tracing::trace!(
                "Element playing at {:.0}ms (rate {}, volume {:.2}, muted {})",
                self.anchor_media_ms,
                self.rate,
                self.volume,
                self.muted
            );
            self.anchor = Instant::now();
            self.paused = false;
        }
    }

    fn pause(&mut self) {
        if !self.paused {
            self.rebase();
            self.paused = true;
        }
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn set_rate(&mut self, rate: f64) {
        self.rebase();
        self.rate = rate;
    }

    fn rate(&self) -> f64 {
        self.rate
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn load(&mut self, data: MediaBytes) {
        self.stats.lock().loads += 1;
        if data.is_empty() {
            self.error = Some("no decodable data".to_string());
        } else {
            self.ready = true;
            self.error = None;
        }
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn error(&self) -> Option<String> {
        self.error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_timeline::{Clip, Timeline, Track, TrackKind};
    use std::time::Duration;

    fn compiled_clip() -> CompiledClip {
        let mut timeline = Timeline::new("Sim", 1000.0);
        let track = timeline.add_track(Track::new("V1", TrackKind::Video));
        timeline
            .add_clip(track, Clip::new(track, "a.mp4", 0.0, 1000.0))
            .unwrap();
        timeline.compile().unwrap().clips()[0].clone()
    }

    #[test]
    fn test_element_keeps_time() {
        let backend = SimulatedBackend::new(0.0);
        let mut element = backend.create_element(&compiled_clip());
        assert!(element.is_paused());

        element.seek(500.0);
        assert_eq!(element.current_time_ms(), 500.0);

        element.play();
        std::thread::sleep(Duration::from_millis(20));
        let t = element.current_time_ms();
        assert!(t >= 520.0);

        element.pause();
        let frozen = element.current_time_ms();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(element.current_time_ms(), frozen);
    }

    #[test]
    fn test_load_sets_ready_or_error() {
        let backend = SimulatedBackend::new(0.0);
        let clip = compiled_clip();

        let mut good = backend.create_element(&clip);
        good.load(MediaBytes::from(vec![1u8, 2, 3]));
        assert!(good.is_ready());
        assert!(good.error().is_none());

        let mut bad = backend.create_element(&clip);
        bad.load(MediaBytes::from(Vec::<u8>::new()));
        assert!(!bad.is_ready());
        assert!(bad.error().is_some());

        assert_eq!(
            backend.stats(),
            SimStats {
                elements_created: 2,
                seeks: 0,
                loads: 2,
            }
        );
    }

    #[test]
    fn test_skew_runs_fast() {
        let backend = SimulatedBackend::new(1.0);
        let mut element = backend.create_element(&compiled_clip());
        element.play();
        std::thread::sleep(Duration::from_millis(20));
        assert!(element.current_time_ms() >= 40.0);
    }
}
