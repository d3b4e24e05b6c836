// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine tuning.
//!
//! The drift threshold and lookahead window are empirical; the defaults
//! below are starting points, not contracts.

use crate::error::{PlaybackError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Playback engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Drift tolerated before an element is corrected
    pub drift_threshold_ms: f64,
    /// Drift beyond which correction is a hard seek instead of a rate nudge
    pub hard_seek_threshold_ms: f64,
    /// Fractional rate change used for soft correction
    pub soft_rate_adjust: f64,
    /// How far ahead of the playhead clips are buffered
    pub lookahead_ms: f64,
    /// How far ahead of its start a clip's element is prepared
    pub pre_arm_ms: f64,
    /// How long an element may stay not-ready before it is given up on
    pub ready_timeout_ms: f64,
    /// How long a seek may wait for elements to become ready
    pub seek_timeout_ms: f64,
    /// Simultaneous fetches
    pub max_concurrent_fetches: usize,
    /// Byte budget for buffered media
    pub max_buffer_bytes: u64,
    /// Entry budget for buffered media
    pub max_buffer_slots: usize,
    /// Only fetch this many leading bytes per source (whole source when unset)
    pub prefetch_head_bytes: Option<u64>,
    /// Retry policy for fetches
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drift_threshold_ms: 80.0,
            hard_seek_threshold_ms: 250.0,
            soft_rate_adjust: 0.02,
            lookahead_ms: 5000.0,
            pre_arm_ms: 500.0,
            ready_timeout_ms: 3000.0,
            seek_timeout_ms: 2000.0,
            max_concurrent_fetches: 3,
            max_buffer_bytes: 512 * 1024 * 1024,
            max_buffer_slots: 64,
            prefetch_head_bytes: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(PlaybackError::InvalidConfig(msg.to_string()));

        let times = [
            self.drift_threshold_ms,
            self.hard_seek_threshold_ms,
            self.lookahead_ms,
            self.pre_arm_ms,
            self.ready_timeout_ms,
            self.seek_timeout_ms,
        ];
        if times.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return invalid("time settings must be finite and non-negative");
        }
        if self.drift_threshold_ms <= 0.0 {
            return invalid("drift_threshold_ms must be positive");
        }
        if self.hard_seek_threshold_ms <= self.drift_threshold_ms {
            return invalid("hard_seek_threshold_ms must exceed drift_threshold_ms");
        }
        if !(self.soft_rate_adjust > 0.0 && self.soft_rate_adjust < 0.5) {
            return invalid("soft_rate_adjust must be in (0, 0.5)");
        }
        if self.max_concurrent_fetches == 0 {
            return invalid("max_concurrent_fetches must be at least 1");
        }
        if self.max_buffer_bytes == 0 || self.max_buffer_slots == 0 {
            return invalid("buffer budgets must be non-zero");
        }
        if self.prefetch_head_bytes == Some(0) {
            return invalid("prefetch_head_bytes must be non-zero when set");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return invalid("retry.backoff_multiplier must be >= 1");
        }
        Ok(())
    }
}
