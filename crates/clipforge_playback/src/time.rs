// SPDX-License-Identifier: MIT OR Apache-2.0
//! Monotonic time sources for drivers producing frame timestamps.

use std::time::Instant;

/// Source of monotonic timestamps in milliseconds
pub trait TimeSource {
    /// Current timestamp
    fn now_ms(&self) -> f64;
}

/// Wall-clock source backed by [`Instant`]
#[derive(Debug, Clone)]
pub struct MonotonicTimeSource {
    origin: Instant,
}

impl MonotonicTimeSource {
    /// Start counting from now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTimeSource {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}
