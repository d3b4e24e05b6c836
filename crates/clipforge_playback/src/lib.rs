// SPDX-License-Identifier: MIT OR Apache-2.0
//! ClipForge playback engine.
//!
//! Drives a compiled timeline in real time:
//! - [`PlaybackClock`] owns the playhead
//! - [`SyncManager`] keeps native media elements within a drift bound
//! - [`BufferManager`] prefetches media bytes under concurrency and memory budgets
//! - [`PlaybackEngine`] ties them together behind a single `tick`

pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod frame;
pub mod media;
pub mod planner;
pub mod retry;
pub mod sync;
pub mod time;

#[cfg(test)]
mod testing;

pub use cache::{
    BufferCallback, BufferEntry, BufferEvent, BufferManager, BufferState, BufferStats, Priority,
    Subscription, SubscriptionId,
};
pub use clock::{ClockEvent, PlaybackClock, PlaybackState, PlaybackStatus};
pub use config::EngineConfig;
pub use engine::PlaybackEngine;
pub use error::{FetchError, PlaybackError, PlaybackWarning, Result};
pub use feed::TimelineFeed;
pub use fetch::{ByteRange, FetchRequest, MediaBytes, MediaFetcher, ProgressSink};
pub use frame::{ActiveClip, FrameState};
pub use media::{MediaBackend, MediaElement, MediaPosition};
pub use planner::PrefetchPlanner;
pub use retry::RetryPolicy;
pub use sync::{SlotRole, SyncContext, SyncManager};
pub use time::{MonotonicTimeSource, TimeSource};
