// SPDX-License-Identifier: MIT OR Apache-2.0
//! Test doubles shared by the unit tests.

use crate::cache::BufferManager;
use crate::error::FetchError;
use crate::fetch::{ByteRange, FetchRequest, MediaBytes, MediaFetcher, ProgressSink};
use crate::media::{MediaBackend, MediaElement};
use clipforge_timeline::{ClipId, CompiledClip};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

type Pending = (oneshot::Sender<Result<MediaBytes, FetchError>>, ProgressSink);

#[derive(Default)]
struct FetcherState {
    calls: Vec<FetchRequest>,
    pending: HashMap<String, Vec<Pending>>,
}

/// Fetcher whose requests are completed by the test
#[derive(Clone, Default)]
pub struct ManualFetcher {
    state: Arc<Mutex<FetcherState>>,
}

impl ManualFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.iter().map(|r| r.url.clone()).collect()
    }

    pub fn last_range(&self, url: &str) -> Option<Option<ByteRange>> {
        self.state
            .lock()
            .calls
            .iter()
            .rev()
            .find(|r| r.url == url)
            .map(|r| r.range)
    }

    /// Resolve the oldest outstanding fetch of `url`
    pub fn complete(&self, url: &str, result: Result<MediaBytes, FetchError>) {
        let pending = {
            let mut state = self.state.lock();
            state
                .pending
                .get_mut(url)
                .filter(|list| !list.is_empty())
                .map(|list| list.remove(0))
        };
        if let Some((tx, _)) = pending {
            let _ = tx.send(result);
        }
    }

    /// Report progress on the newest outstanding fetch of `url`
    pub fn progress(&self, url: &str, loaded: u64, total: Option<u64>) {
        let state = self.state.lock();
        if let Some((_, sink)) = state.pending.get(url).and_then(|list| list.last()) {
            sink.report(loaded, total);
        }
    }
}

impl MediaFetcher for ManualFetcher {
    fn fetch(&self, request: FetchRequest, progress: ProgressSink) -> BoxFuture<'static, Result<MediaBytes, FetchError>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock();
            state
                .pending
                .entry(request.url.clone())
                .or_default()
                .push((tx, progress));
            state.calls.push(request);
        }
        async move { rx.await.unwrap_or(Err(FetchError::Cancelled)) }.boxed()
    }
}

/// Let spawned fetch tasks run, then apply their results
pub async fn settle(cache: &mut BufferManager) {
    for _ in 0..16 {
        tokio::task::yield_now().await;
        cache.pump();
    }
}

/// Observable state of a [`TestElement`]
#[derive(Debug, Clone, PartialEq)]
pub struct ElementState {
    pub time_ms: f64,
    pub paused: bool,
    pub rate: f64,
    pub muted: bool,
    pub volume: f64,
    pub loaded: bool,
    pub seeks: Vec<f64>,
    pub error: Option<String>,
    /// Ready as soon as bytes are loaded
    pub ready_on_load: bool,
}

impl Default for ElementState {
    fn default() -> Self {
        Self {
            time_ms: 0.0,
            paused: true,
            rate: 1.0,
            muted: true,
            volume: 1.0,
            loaded: false,
            seeks: Vec::new(),
            error: None,
            ready_on_load: true,
        }
    }
}

/// Element driven entirely by the test
pub struct TestElement {
    state: Arc<Mutex<ElementState>>,
}

impl MediaElement for TestElement {
    fn current_time_ms(&self) -> f64 {
        self.state.lock().time_ms
    }

    fn seek(&mut self, media_ms: f64) {
        let mut state = self.state.lock();
        state.time_ms = media_ms;
        state.seeks.push(media_ms);
    }

    fn play(&mut self) {
        self.state.lock().paused = false;
    }

    fn pause(&mut self) {
        self.state.lock().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn set_rate(&mut self, rate: f64) {
        self.state.lock().rate = rate;
    }

    fn rate(&self) -> f64 {
        self.state.lock().rate
    }

    fn set_muted(&mut self, muted: bool) {
        self.state.lock().muted = muted;
    }

    fn set_volume(&mut self, volume: f64) {
        self.state.lock().volume = volume;
    }

    fn load(&mut self, _data: MediaBytes) {
        self.state.lock().loaded = true;
    }

    fn is_ready(&self) -> bool {
        let state = self.state.lock();
        state.loaded && state.ready_on_load
    }

    fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }
}

/// Backend handing out [`TestElement`]s whose state the test can inspect
#[derive(Clone, Default)]
pub struct TestBackend {
    elements: Arc<Mutex<HashMap<ClipId, Arc<Mutex<ElementState>>>>>,
    created: Arc<Mutex<Vec<ClipId>>>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of the element created for `clip`
    pub fn element(&self, clip: ClipId) -> Option<ElementState> {
        self.elements.lock().get(&clip).map(|s| s.lock().clone())
    }

    /// Mutate the element created for `clip`
    pub fn with_element(&self, clip: ClipId, f: impl FnOnce(&mut ElementState)) {
        if let Some(state) = self.elements.lock().get(&clip) {
            f(&mut state.lock());
        }
    }

    /// Move every playing element forward by `delta_ms` of source time
    pub fn advance_playing(&self, delta_ms: f64) {
        for state in self.elements.lock().values() {
            let mut state = state.lock();
            if !state.paused {
                let rate = state.rate;
                state.time_ms += delta_ms * rate;
            }
        }
    }

    /// Number of elements created for `clip`
    pub fn created_count(&self, clip: ClipId) -> usize {
        self.created.lock().iter().filter(|c| **c == clip).count()
    }
}

impl MediaBackend for TestBackend {
    fn create_element(&self, clip: &CompiledClip) -> Box<dyn MediaElement> {
        let state = Arc::new(Mutex::new(ElementState::default()));
        self.elements.lock().insert(clip.id, state.clone());
        self.created.lock().push(clip.id);
        Box::new(TestElement { state })
    }
}
