// SPDX-License-Identifier: MIT OR Apache-2.0
//! Predictive media buffer.
//!
//! Fetches run as tokio tasks; their progress and results come back over a
//! channel that [`BufferManager::pump`] drains once per tick. The manager is
//! the only writer of entry state.

use crate::config::EngineConfig;
use crate::error::{FetchError, PlaybackError, Result};
use crate::fetch::{percent, ByteRange, FetchMessage, FetchRequest, MediaBytes, MediaFetcher, ProgressSink};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// How urgently a source is needed
#[derive(Debug, Clone, Copy)]
pub enum Priority {
    /// A clip at the playhead needs it now
    Active,
    /// A clip starts this far ahead of the playhead
    Lookahead {
        /// Distance from the playhead
        distance_ms: f64,
    },
    /// Wanted eventually
    Background {
        /// Distance from the playhead
        distance_ms: f64,
    },
}

impl Priority {
    fn rank(&self) -> (u8, f64) {
        match *self {
            Self::Active => (2, 0.0),
            Self::Lookahead { distance_ms } => (1, distance_ms),
            Self::Background { distance_ms } => (0, distance_ms),
        }
    }
}

/// `Greater` means more urgent; nearer beats farther within a class
impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        let (class_a, dist_a) = self.rank();
        let (class_b, dist_b) = other.rank();
        class_a
            .cmp(&class_b)
            .then_with(|| dist_b.total_cmp(&dist_a))
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Priority {}

/// Lifecycle of a buffer entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Waiting for a fetch slot
    Queued,
    /// Fetch in flight
    Loading,
    /// Bytes available
    Ready,
    /// Fetch gave up
    Failed,
}

impl BufferState {
    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Loading => "Loading",
            Self::Ready => "Ready",
            Self::Failed => "Failed",
        }
    }
}

/// Notification delivered to buffer subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum BufferEvent {
    /// Progress rose
    Progress {
        /// Media source
        url: String,
        /// Percent loaded in `[0, 100]`
        percent: f64,
    },
    /// Bytes are available
    Ready {
        /// Media source
        url: String,
        /// Bytes held
        size: u64,
    },
    /// The request will not complete
    Failed {
        /// Media source
        url: String,
        /// What went wrong
        reason: String,
    },
}

impl BufferEvent {
    /// Whether no further events follow for this request
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

/// Callback invoked with buffer events
pub type BufferCallback = Box<dyn FnMut(&BufferEvent)>;

/// Subscription handle ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Result of a buffer request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Requested source
    pub url: String,
    /// Callback registration, when one was given
    pub id: Option<SubscriptionId>,
}

struct Subscriber {
    url: String,
    callback: BufferCallback,
}

/// Cached record of one media source
pub struct BufferEntry {
    /// Media source
    pub url: String,
    /// Byte range requested
    pub range: Option<ByteRange>,
    /// Bytes held once ready
    pub size: u64,
    /// Logical access stamp for LRU ordering
    pub last_access: u64,
    /// Lifecycle state
    pub state: BufferState,
    /// Number of holders
    pub ref_count: usize,
    /// Percent loaded in `[0, 100]`
    pub progress: f64,
    /// Current urgency
    pub priority: Priority,
    /// Last failure
    pub error: Option<String>,
    data: Option<MediaBytes>,
    generation: u64,
    seq: u64,
    task: Option<AbortHandle>,
}

impl BufferEntry {
    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Aggregate buffer state for buffering indicators
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BufferStats {
    /// Entries held
    pub entries: usize,
    /// Entries waiting for a slot
    pub queued: usize,
    /// Entries being fetched
    pub loading: usize,
    /// Entries with bytes
    pub ready: usize,
    /// Entries that gave up
    pub failed: usize,
    /// Bytes held by ready entries
    pub bytes: u64,
    /// Mean progress of unfinished and ready entries
    pub overall_progress: f64,
}

impl BufferStats {
    /// Whether any fetch is outstanding
    pub fn is_buffering(&self) -> bool {
        self.queued + self.loading > 0
    }
}

/// Predictive cache of media bytes
pub struct BufferManager {
    config: EngineConfig,
    fetcher: Arc<dyn MediaFetcher>,
    runtime: Handle,
    entries: IndexMap<String, BufferEntry>,
    subscribers: IndexMap<SubscriptionId, Subscriber>,
    message_tx: mpsc::UnboundedSender<FetchMessage>,
    message_rx: mpsc::UnboundedReceiver<FetchMessage>,
    ready_bytes: u64,
    next_generation: u64,
    next_seq: u64,
    access_clock: u64,
    next_subscription: u64,
}

impl BufferManager {
    /// Create a new buffer manager spawning fetches on `runtime`
    pub fn new(config: EngineConfig, fetcher: Arc<dyn MediaFetcher>, runtime: Handle) -> Self {
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        Self {
            config,
            fetcher,
            runtime,
            entries: IndexMap::new(),
            subscribers: IndexMap::new(),
            message_tx,
            message_rx,
            ready_bytes: 0,
            next_generation: 0,
            next_seq: 0,
            access_clock: 0,
            next_subscription: 0,
        }
    }

    /// Acquire a reference to `url`, fetching it if needed
    pub fn request(&mut self, url: &str, priority: Priority) -> Result<Subscription> {
        self.acquire(url, priority)?;
        Ok(Subscription {
            url: url.to_string(),
            id: None,
        })
    }

    /// Like [`request`](Self::request), registering `callback` for its events
    pub fn request_with(
        &mut self,
        url: &str,
        priority: Priority,
        callback: impl FnMut(&BufferEvent) + 'static,
    ) -> Result<Subscription> {
        self.acquire(url, priority)?;
        let id = self.subscribe(url, callback);
        Ok(Subscription {
            url: url.to_string(),
            id: Some(id),
        })
    }

    fn acquire(&mut self, url: &str, priority: Priority) -> Result<()> {
        let stamp = self.touch();
        if let Some(entry) = self.entries.get_mut(url) {
            entry.ref_count += 1;
            entry.last_access = stamp;
            if priority > entry.priority {
                entry.priority = priority;
            }
            if entry.state == BufferState::Failed {
                tracing::debug!("Retrying failed source {}", url);
                entry.state = BufferState::Queued;
                entry.error = None;
                entry.progress = 0.0;
                entry.seq = self.next_seq;
                self.next_seq += 1;
            }
            self.schedule();
            return Ok(());
        }

        self.make_room(url, priority)?;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            url.to_string(),
            BufferEntry {
                url: url.to_string(),
                range: self.config.prefetch_head_bytes.map(ByteRange::head),
                size: 0,
                last_access: stamp,
                state: BufferState::Queued,
                ref_count: 1,
                progress: 0.0,
                priority,
                error: None,
                data: None,
                generation: 0,
                seq,
                task: None,
            },
        );
        self.schedule();
        Ok(())
    }

    /// Drop a reference; unfinished work nobody holds is cancelled
    pub fn release(&mut self, url: &str) {
        let stamp = self.touch();
        let Some(entry) = self.entries.get_mut(url) else {
            return;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        entry.last_access = stamp;
        if entry.ref_count > 0 {
            return;
        }

        match entry.state {
            BufferState::Queued | BufferState::Loading => {
                tracing::debug!("Cancelling unreferenced fetch of {}", url);
                entry.abort();
                self.entries.shift_remove(url);
                self.emit(
                    url,
                    BufferEvent::Failed {
                        url: url.to_string(),
                        reason: FetchError::Cancelled.to_string(),
                    },
                );
                self.schedule();
            }
            BufferState::Failed => {
                self.entries.shift_remove(url);
            }
            // Kept as an eviction candidate
            BufferState::Ready => {}
        }
    }

    /// Change the urgency of a held source
    pub fn reprioritize(&mut self, url: &str, priority: Priority) {
        if let Some(entry) = self.entries.get_mut(url) {
            if entry.priority != priority {
                entry.priority = priority;
                self.schedule();
            }
        }
    }

    /// Get the state of a source
    pub fn state(&self, url: &str) -> Option<BufferState> {
        self.entries.get(url).map(|e| e.state)
    }

    /// Get the entry for a source
    pub fn entry(&self, url: &str) -> Option<&BufferEntry> {
        self.entries.get(url)
    }

    /// Get the bytes of a ready source
    pub fn data(&self, url: &str) -> Option<MediaBytes> {
        self.entries.get(url).and_then(|e| e.data.clone())
    }

    /// Get the progress of a source
    pub fn progress(&self, url: &str) -> Option<f64> {
        self.entries.get(url).map(|e| e.progress)
    }

    /// Get all entries
    pub fn entries(&self) -> impl Iterator<Item = &BufferEntry> {
        self.entries.values()
    }

    /// Register a callback for a source's events
    ///
    /// A source that already finished delivers its terminal event right away
    /// and the callback is not kept.
    pub fn subscribe(&mut self, url: &str, callback: impl FnMut(&BufferEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        let mut callback: BufferCallback = Box::new(callback);

        let finished = self.entries.get(url).and_then(|entry| match entry.state {
            BufferState::Ready => Some(BufferEvent::Ready {
                url: url.to_string(),
                size: entry.size,
            }),
            BufferState::Failed => Some(BufferEvent::Failed {
                url: url.to_string(),
                reason: entry.error.clone().unwrap_or_default(),
            }),
            BufferState::Queued | BufferState::Loading => None,
        });

        match finished {
            Some(event) => callback(&event),
            None => {
                self.subscribers.insert(
                    id,
                    Subscriber {
                        url: url.to_string(),
                        callback,
                    },
                );
            }
        }
        id
    }

    /// Remove a callback
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.shift_remove(&id).is_some()
    }

    /// Apply finished work and start queued fetches
    pub fn pump(&mut self) {
        while let Ok(message) = self.message_rx.try_recv() {
            match message {
                FetchMessage::Progress {
                    url,
                    generation,
                    loaded,
                    total,
                } => self.on_progress(&url, generation, loaded, total),
                FetchMessage::Finished {
                    url,
                    generation,
                    result,
                } => self.on_finished(&url, generation, result),
            }
        }
        self.schedule();
    }

    /// Get aggregate statistics
    pub fn stats(&self) -> BufferStats {
        let mut stats = BufferStats {
            entries: self.entries.len(),
            bytes: self.ready_bytes,
            ..BufferStats::default()
        };
        let mut progress_sum = 0.0;
        for entry in self.entries.values() {
            match entry.state {
                BufferState::Queued => stats.queued += 1,
                BufferState::Loading => stats.loading += 1,
                BufferState::Ready => stats.ready += 1,
                BufferState::Failed => {
                    stats.failed += 1;
                    continue;
                }
            }
            progress_sum += entry.progress;
        }
        let counted = stats.entries - stats.failed;
        stats.overall_progress = if counted == 0 {
            100.0
        } else {
            progress_sum / counted as f64
        };
        stats
    }

    fn touch(&mut self) -> u64 {
        self.access_clock += 1;
        self.access_clock
    }

    fn on_progress(&mut self, url: &str, generation: u64, loaded: u64, total: Option<u64>) {
        let Some(entry) = self.entries.get_mut(url) else {
            return;
        };
        if entry.generation != generation || entry.state != BufferState::Loading {
            return;
        }
        let Some(pct) = percent(loaded, total) else {
            return;
        };
        if pct > entry.progress {
            entry.progress = pct;
            self.emit(
                url,
                BufferEvent::Progress {
                    url: url.to_string(),
                    percent: pct,
                },
            );
        }
    }

    fn on_finished(&mut self, url: &str, generation: u64, result: std::result::Result<MediaBytes, FetchError>) {
        let stamp = self.touch();
        let Some(entry) = self.entries.get_mut(url) else {
            return;
        };
        if entry.generation != generation || entry.state != BufferState::Loading {
            return;
        }
        entry.task = None;

        match result {
            Ok(data) => {
                let size = data.len() as u64;
                entry.data = Some(data);
                entry.size = size;
                entry.state = BufferState::Ready;
                entry.progress = 100.0;
                entry.last_access = stamp;
                self.ready_bytes += size;
                tracing::debug!("Buffered {} ({} bytes)", url, size);
                self.emit(
                    url,
                    BufferEvent::Ready {
                        url: url.to_string(),
                        size,
                    },
                );
                self.enforce_byte_budget();
            }
            Err(err) => {
                tracing::warn!("Failed to buffer {}: {}", url, err);
                entry.state = BufferState::Failed;
                entry.error = Some(err.to_string());
                self.emit(
                    url,
                    BufferEvent::Failed {
                        url: url.to_string(),
                        reason: err.to_string(),
                    },
                );
            }
        }
    }

    fn emit(&mut self, url: &str, event: BufferEvent) {
        let terminal = event.is_terminal();
        self.subscribers.retain(|_, subscriber| {
            if subscriber.url != url {
                return true;
            }
            (subscriber.callback)(&event);
            !terminal
        });
    }

    /// Start queued fetches while slots are free, preempting less urgent ones
    fn schedule(&mut self) {
        loop {
            let Some(next) = self.most_urgent_queued() else {
                break;
            };
            let in_flight = self
                .entries
                .values()
                .filter(|e| e.state == BufferState::Loading)
                .count();

            if in_flight < self.config.max_concurrent_fetches {
                self.start_fetch(next);
                continue;
            }

            let Some(victim) = self.least_urgent_loading() else {
                break;
            };
            if self.entries[next].priority > self.entries[victim].priority {
                self.preempt(victim);
                self.start_fetch(next);
                continue;
            }
            break;
        }
    }

    fn most_urgent_queued(&self) -> Option<usize> {
        self.entries
            .values()
            .enumerate()
            .filter(|(_, e)| e.state == BufferState::Queued)
            .max_by(|(_, a), (_, b)| a.priority.cmp(&b.priority).then_with(|| b.seq.cmp(&a.seq)))
            .map(|(i, _)| i)
    }

    fn least_urgent_loading(&self) -> Option<usize> {
        self.entries
            .values()
            .enumerate()
            .filter(|(_, e)| e.state == BufferState::Loading)
            .min_by(|(_, a), (_, b)| a.priority.cmp(&b.priority).then_with(|| b.seq.cmp(&a.seq)))
            .map(|(i, _)| i)
    }

    fn preempt(&mut self, index: usize) {
        if let Some((url, entry)) = self.entries.get_index_mut(index) {
            tracing::debug!("Preempting fetch of {}", url);
            entry.abort();
            entry.state = BufferState::Queued;
            // Stale messages from the aborted task are ignored
            entry.generation = u64::MAX;
        }
    }

    fn start_fetch(&mut self, index: usize) {
        let generation = self.next_generation;
        self.next_generation += 1;

        let Some((url, entry)) = self.entries.get_index_mut(index) else {
            return;
        };
        entry.state = BufferState::Loading;
        entry.generation = generation;

        let url: Arc<str> = Arc::from(url.as_str());
        let request = FetchRequest {
            url: url.to_string(),
            range: entry.range,
        };
        tracing::debug!("Fetching {} ({:?})", url, entry.priority);

        let sink = ProgressSink::new(url.clone(), generation, self.message_tx.clone());
        let fetcher = self.fetcher.clone();
        let retry = self.config.retry.clone();
        let tx = self.message_tx.clone();

        let task = self.runtime.spawn(async move {
            let result = retry
                .run(|_attempt| fetcher.fetch(request.clone(), sink.clone()))
                .await;
            // Receiver gone means the manager was dropped
            let _ = tx.send(FetchMessage::Finished {
                url,
                generation,
                result,
            });
        });
        entry.task = Some(task.abort_handle());
    }

    /// Evict the least recently used unreferenced ready entry
    fn evict_one(&mut self) -> bool {
        let victim = self
            .entries
            .iter()
            .filter(|(_, e)| e.state == BufferState::Ready && e.ref_count == 0)
            .min_by_key(|(_, e)| e.last_access)
            .map(|(url, _)| url.clone());

        match victim {
            Some(url) => {
                if let Some(entry) = self.entries.shift_remove(&url) {
                    self.ready_bytes = self.ready_bytes.saturating_sub(entry.size);
                    tracing::debug!("Evicted {} ({} bytes)", url, entry.size);
                }
                true
            }
            None => false,
        }
    }

    fn lowest_queued(&self) -> Option<(String, Priority)> {
        self.entries
            .values()
            .filter(|e| e.state == BufferState::Queued)
            .min_by(|a, b| a.priority.cmp(&b.priority).then_with(|| b.seq.cmp(&a.seq)))
            .map(|e| (e.url.clone(), e.priority))
    }

    fn deny(&mut self, url: &str) {
        tracing::warn!("Buffer budget exhausted, denying request for {}", url);
        if let Some(mut entry) = self.entries.shift_remove(url) {
            entry.abort();
        }
        self.emit(
            url,
            BufferEvent::Failed {
                url: url.to_string(),
                reason: PlaybackError::BufferCapacityExceeded { url: url.to_string() }.to_string(),
            },
        );
    }

    /// Free space for a new entry or refuse it
    fn make_room(&mut self, url: &str, priority: Priority) -> Result<()> {
        while self.ready_bytes >= self.config.max_buffer_bytes {
            if !self.evict_one() {
                tracing::warn!("Buffer byte budget exhausted, denying request for {}", url);
                return Err(PlaybackError::BufferCapacityExceeded { url: url.to_string() });
            }
        }
        while self.entries.len() >= self.config.max_buffer_slots {
            if self.evict_one() {
                continue;
            }
            match self.lowest_queued() {
                Some((lowest, lowest_priority)) if lowest_priority < priority => self.deny(&lowest),
                _ => {
                    tracing::warn!("Buffer slots exhausted, denying request for {}", url);
                    return Err(PlaybackError::BufferCapacityExceeded { url: url.to_string() });
                }
            }
        }
        Ok(())
    }

    fn enforce_byte_budget(&mut self) {
        while self.ready_bytes > self.config.max_buffer_bytes {
            if self.evict_one() {
                continue;
            }
            match self.lowest_queued() {
                Some((lowest, _)) => self.deny(&lowest),
                None => break,
            }
        }
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        for entry in self.entries.values_mut() {
            entry.abort();
        }
    }
}
