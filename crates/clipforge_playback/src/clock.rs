// SPDX-License-Identifier: MIT OR Apache-2.0
//! Playback clock: the single writer of the playhead.
//!
//! Time is derived from an anchor `(timestamp, media time)` recorded when
//! playback (re)starts, so dropped or jittery frames never accumulate error.
//! Frame timestamps passed to [`PlaybackClock::tick`] are the only time
//! base: commands issued between frames anchor to the last frame seen, or
//! to the next one when no frame has arrived yet.

use crate::error::{PlaybackError, Result};

/// Playback status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    /// Not started, or stopped at the end
    #[default]
    Idle,
    /// Advancing with each tick
    Playing,
    /// Frozen at the current time
    Paused,
    /// Waiting for media to settle at a new position
    Seeking,
}

/// Observable clock state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    /// Playback status
    pub status: PlaybackStatus,
    /// Playhead position
    pub current_ms: f64,
    /// Target of an unfinished seek
    pub seek_target_ms: Option<f64>,
    /// Playback speed multiplier
    pub rate: f64,
}

/// What a tick did to the playhead
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockEvent {
    /// Time did not move
    Unchanged,
    /// Time moved forward
    Advanced {
        /// Playhead before the tick
        from_ms: f64,
        /// Playhead after the tick
        to_ms: f64,
    },
    /// Playback hit the end of the timeline and went idle
    ReachedEnd,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Anchor {
    timestamp_ms: f64,
    media_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingSeek {
    target_ms: f64,
    resume: PlaybackStatus,
    started_at_ms: Option<f64>,
}

/// Playback clock for a timeline
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    status: PlaybackStatus,
    current_ms: f64,
    rate: f64,
    duration_ms: f64,
    anchor: Option<Anchor>,
    seek: Option<PendingSeek>,
    last_frame_ms: Option<f64>,
}

impl PlaybackClock {
    /// Create an idle clock for a timeline of `duration_ms`
    pub fn new(duration_ms: f64) -> Self {
        Self {
            status: PlaybackStatus::Idle,
            current_ms: 0.0,
            rate: 1.0,
            duration_ms: duration_ms.max(0.0),
            anchor: None,
            seek: None,
            last_frame_ms: None,
        }
    }

    /// Current playback status
    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    /// Current playhead
    pub fn current_ms(&self) -> f64 {
        self.current_ms
    }

    /// Playback speed multiplier
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Timeline length
    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    /// Timestamp of the latest frame
    pub fn last_frame_ms(&self) -> Option<f64> {
        self.last_frame_ms
    }

    /// Snapshot of the observable state
    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            status: self.status,
            current_ms: self.current_ms,
            seek_target_ms: self.seek.map(|s| s.target_ms),
            rate: self.rate,
        }
    }

    /// Is currently playing
    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    /// Whether playback will run once any pending seek settles
    pub fn wants_playback(&self) -> bool {
        match self.seek {
            Some(seek) => seek.resume == PlaybackStatus::Playing,
            None => self.is_playing(),
        }
    }

    /// Start or resume playback; returns whether anything changed
    pub fn play(&mut self) -> bool {
        match self.status {
            PlaybackStatus::Idle | PlaybackStatus::Paused => {
                if self.current_ms >= self.duration_ms {
                    self.current_ms = 0.0;
                }
                self.status = PlaybackStatus::Playing;
                self.anchor = self.anchor_here();
                true
            }
            PlaybackStatus::Seeking => match &mut self.seek {
                Some(seek) if seek.resume != PlaybackStatus::Playing => {
                    seek.resume = PlaybackStatus::Playing;
                    true
                }
                _ => false,
            },
            PlaybackStatus::Playing => false,
        }
    }

    /// Freeze playback; returns whether anything changed
    pub fn pause(&mut self) -> bool {
        match self.status {
            PlaybackStatus::Playing => {
                self.status = PlaybackStatus::Paused;
                self.anchor = None;
                true
            }
            PlaybackStatus::Seeking => match &mut self.seek {
                Some(seek) if seek.resume == PlaybackStatus::Playing => {
                    seek.resume = PlaybackStatus::Paused;
                    true
                }
                _ => false,
            },
            PlaybackStatus::Idle | PlaybackStatus::Paused => false,
        }
    }

    /// Stop and reset to the beginning
    pub fn stop(&mut self) {
        self.status = PlaybackStatus::Idle;
        self.current_ms = 0.0;
        self.anchor = None;
        self.seek = None;
    }

    /// Move the playhead and enter the seeking state; returns the clamped target
    pub fn seek(&mut self, target_ms: f64) -> f64 {
        let target_ms = if target_ms.is_nan() {
            0.0
        } else {
            target_ms.clamp(0.0, self.duration_ms)
        };
        let resume = match (self.seek, self.status) {
            (Some(pending), _) => pending.resume,
            (None, PlaybackStatus::Idle) => PlaybackStatus::Paused,
            (None, status) => status,
        };
        // Re-seeking to the same target keeps the timeout running
        let started_at_ms = match self.seek {
            Some(pending) if pending.target_ms == target_ms => pending.started_at_ms,
            _ => self.last_frame_ms,
        };
        self.seek = Some(PendingSeek {
            target_ms,
            resume,
            started_at_ms,
        });
        self.status = PlaybackStatus::Seeking;
        self.current_ms = target_ms;
        self.anchor = None;
        target_ms
    }

    /// How long the pending seek has been waiting
    ///
    /// `None` until a frame has been seen since the seek was issued.
    pub fn seek_elapsed_ms(&self, now_ms: f64) -> Option<f64> {
        let started_at_ms = self.seek?.started_at_ms?;
        Some((now_ms - started_at_ms).max(0.0))
    }

    /// Leave the seeking state, restoring the status active before the seek
    pub fn finish_seek(&mut self) -> Option<PlaybackStatus> {
        let seek = self.seek.take()?;
        self.status = seek.resume;
        if self.status == PlaybackStatus::Playing {
            self.anchor = self.anchor_here();
        }
        Some(self.status)
    }

    /// Change the playback speed, re-anchoring so no time is lost
    pub fn set_rate(&mut self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PlaybackError::InvalidConfig(format!(
                "playback rate must be positive, got {rate}"
            )));
        }
        // The playhead is current as of the last frame
        if self.anchor.is_some() {
            self.anchor = self.anchor_here();
        }
        self.rate = rate;
        Ok(())
    }

    fn anchor_here(&self) -> Option<Anchor> {
        self.last_frame_ms.map(|timestamp_ms| Anchor {
            timestamp_ms,
            media_ms: self.current_ms,
        })
    }

    /// Adopt a new timeline length
    pub fn set_duration(&mut self, duration_ms: f64) {
        self.duration_ms = duration_ms.max(0.0);
        if self.current_ms > self.duration_ms {
            self.current_ms = self.duration_ms;
            if let Some(anchor) = &mut self.anchor {
                anchor.media_ms = self.duration_ms;
            }
        }
        if let Some(seek) = &mut self.seek {
            seek.target_ms = seek.target_ms.min(self.duration_ms);
        }
    }

    /// Advance for one animation frame
    pub fn tick(&mut self, frame_ts_ms: f64) -> ClockEvent {
        if self.last_frame_ms.is_some_and(|last| frame_ts_ms < last) {
            tracing::trace!("Ignoring out-of-order frame at {:.1}ms", frame_ts_ms);
            return ClockEvent::Unchanged;
        }
        self.last_frame_ms = Some(frame_ts_ms);
        if let Some(seek) = &mut self.seek {
            seek.started_at_ms.get_or_insert(frame_ts_ms);
        }

        if self.status != PlaybackStatus::Playing {
            return ClockEvent::Unchanged;
        }
        let anchor = *self.anchor.get_or_insert(Anchor {
            timestamp_ms: frame_ts_ms,
            media_ms: self.current_ms,
        });
        if frame_ts_ms < anchor.timestamp_ms {
            return ClockEvent::Unchanged;
        }

        let from_ms = self.current_ms;
        let to_ms = anchor.media_ms + (frame_ts_ms - anchor.timestamp_ms) * self.rate;

        if to_ms >= self.duration_ms {
            self.current_ms = self.duration_ms;
            self.status = PlaybackStatus::Idle;
            self.anchor = None;
            return ClockEvent::ReachedEnd;
        }

        self.current_ms = to_ms;
        if to_ms == from_ms {
            ClockEvent::Unchanged
        } else {
            ClockEvent::Advanced { from_ms, to_ms }
        }
    }
}
