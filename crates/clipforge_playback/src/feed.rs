// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline change notification.
//!
//! The editor publishes; the engine picks up the newest snapshot at the
//! start of its next tick.

use crate::error::Result;
use clipforge_timeline::{Timeline, TimelineSnapshot};
use std::sync::Arc;
use tokio::sync::watch;

/// Publisher of compiled timeline snapshots
#[derive(Debug)]
pub struct TimelineFeed {
    tx: watch::Sender<Arc<TimelineSnapshot>>,
}

impl TimelineFeed {
    /// Create a feed starting from `timeline`
    pub fn new(timeline: &Timeline) -> Result<Self> {
        let snapshot = timeline.compile()?;
        let (tx, _rx) = watch::channel(Arc::new(snapshot));
        Ok(Self { tx })
    }

    /// Validate, compile and publish an edited timeline
    ///
    /// Invalid timelines are rejected and the previous snapshot stays live.
    pub fn publish(&self, timeline: &Timeline) -> Result<()> {
        let snapshot = timeline.compile()?;
        tracing::debug!("Publishing timeline {:?} ({} clips)", snapshot.id, snapshot.clips().len());
        self.tx.send_replace(Arc::new(snapshot));
        Ok(())
    }

    /// Receiver for the engine
    pub fn subscribe(&self) -> watch::Receiver<Arc<TimelineSnapshot>> {
        self.tx.subscribe()
    }

    /// Latest published snapshot
    pub fn current(&self) -> Arc<TimelineSnapshot> {
        self.tx.borrow().clone()
    }
}
