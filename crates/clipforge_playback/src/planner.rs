// SPDX-License-Identifier: MIT OR Apache-2.0
//! Decides which sources the buffer should hold around the playhead.

use crate::cache::{BufferManager, Priority};
use crate::error::PlaybackError;
use clipforge_timeline::TimelineSnapshot;
use indexmap::{IndexMap, IndexSet};

/// Holds one buffer reference per source wanted within the lookahead window
#[derive(Debug, Default)]
pub struct PrefetchPlanner {
    held: IndexMap<String, Priority>,
    denied: IndexSet<String>,
}

impl PrefetchPlanner {
    /// Create a new planner
    pub fn new() -> Self {
        Self::default()
    }

    /// Sources currently held and their priority
    pub fn held(&self) -> impl Iterator<Item = (&str, Priority)> {
        self.held.iter().map(|(url, p)| (url.as_str(), *p))
    }

    /// Sync buffer references with the window `[time_ms, time_ms + lookahead_ms]`
    ///
    /// Returns requests newly refused for lack of capacity. Refused sources
    /// are retried on later ticks.
    pub fn plan(
        &mut self,
        time_ms: f64,
        lookahead_ms: f64,
        timeline: &TimelineSnapshot,
        cache: &mut BufferManager,
    ) -> Vec<PlaybackError> {
        let mut wanted: IndexMap<&str, Priority> = IndexMap::new();
        for clip in timeline
            .clips_overlapping(time_ms, time_ms + lookahead_ms)
            .filter(|c| c.has_media_element())
        {
            let priority = if clip.start_ms <= time_ms {
                Priority::Active
            } else {
                Priority::Lookahead {
                    distance_ms: clip.start_ms - time_ms,
                }
            };
            let slot = wanted.entry(clip.source_url.as_str()).or_insert(priority);
            if priority > *slot {
                *slot = priority;
            }
        }

        // Leaving the window cancels whatever has not finished
        self.held.retain(|url, _| {
            if wanted.contains_key(url.as_str()) {
                true
            } else {
                cache.release(url);
                false
            }
        });
        self.denied.retain(|url| wanted.contains_key(url.as_str()));

        let mut refused = Vec::new();
        for (url, priority) in wanted {
            if self.held.contains_key(url) && cache.state(url).is_some() {
                cache.reprioritize(url, priority);
                self.held.insert(url.to_string(), priority);
                continue;
            }
            // Entry vanished (denied while queued) or never requested
            self.held.shift_remove(url);
            match cache.request(url, priority) {
                Ok(_) => {
                    self.denied.shift_remove(url);
                    self.held.insert(url.to_string(), priority);
                }
                Err(err) => {
                    if self.denied.insert(url.to_string()) {
                        refused.push(err);
                    }
                }
            }
        }
        refused
    }

    /// Drop every held reference
    pub fn release_all(&mut self, cache: &mut BufferManager) {
        for (url, _) in self.held.drain(..) {
            cache.release(&url);
        }
        self.denied.clear();
    }
}
