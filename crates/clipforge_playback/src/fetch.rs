// SPDX-License-Identifier: MIT OR Apache-2.0
//! Network/storage seam used by the buffer manager.

use crate::error::FetchError;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Shared, immutable media bytes
pub type MediaBytes = Arc<[u8]>;

/// Half-open byte range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// First byte
    pub start: u64,
    /// One past the last byte
    pub end: u64,
}

impl ByteRange {
    /// Leading `len` bytes of a source
    pub fn head(len: u64) -> Self {
        Self { start: 0, end: len }
    }

    /// Number of bytes covered
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the range covers nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Media source
    pub url: String,
    /// Bytes wanted (whole source when `None`)
    pub range: Option<ByteRange>,
}

/// Messages sent from fetch tasks back to the buffer manager
#[derive(Debug)]
pub(crate) enum FetchMessage {
    Progress {
        url: Arc<str>,
        generation: u64,
        loaded: u64,
        total: Option<u64>,
    },
    Finished {
        url: Arc<str>,
        generation: u64,
        result: Result<MediaBytes, FetchError>,
    },
}

#[derive(Debug, Clone)]
enum SinkTarget {
    Channel {
        url: Arc<str>,
        generation: u64,
        tx: mpsc::UnboundedSender<FetchMessage>,
    },
    Detached,
}

/// Where a fetcher reports how many bytes have arrived
#[derive(Debug, Clone)]
pub struct ProgressSink {
    target: SinkTarget,
}

impl ProgressSink {
    pub(crate) fn new(url: Arc<str>, generation: u64, tx: mpsc::UnboundedSender<FetchMessage>) -> Self {
        Self {
            target: SinkTarget::Channel { url, generation, tx },
        }
    }

    /// Sink that discards every report
    pub fn detached() -> Self {
        Self {
            target: SinkTarget::Detached,
        }
    }

    /// Report `loaded` bytes out of `total` (when known)
    pub fn report(&self, loaded: u64, total: Option<u64>) {
        if let SinkTarget::Channel { url, generation, tx } = &self.target {
            // Receiver gone means the manager was dropped
            let _ = tx.send(FetchMessage::Progress {
                url: url.clone(),
                generation: *generation,
                loaded,
                total,
            });
        }
    }
}

/// Source of media bytes
pub trait MediaFetcher: Send + Sync + 'static {
    /// Fetch the requested bytes, reporting progress along the way
    fn fetch(
        &self,
        request: FetchRequest,
        progress: ProgressSink,
    ) -> BoxFuture<'static, Result<MediaBytes, FetchError>>;
}

/// Convert a byte count into a percentage, clamped to `[0, 100]`
pub(crate) fn percent(loaded: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(0) => Some(100.0),
        Some(total) => Some((loaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(50, Some(200)), Some(25.0));
        assert_eq!(percent(300, Some(200)), Some(100.0));
        assert_eq!(percent(0, Some(0)), Some(100.0));
        assert_eq!(percent(10, None), None);
    }

    #[test]
    fn test_sink_tags_messages() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ProgressSink::new(Arc::from("a.mp4"), 7, tx);
        sink.report(10, Some(100));
        match rx.try_recv() {
            Ok(FetchMessage::Progress { url, generation, loaded, total }) => {
                assert_eq!(&*url, "a.mp4");
                assert_eq!(generation, 7);
                assert_eq!(loaded, 10);
                assert_eq!(total, Some(100));
            }
            other => panic!("unexpected message: {other:?}"),
        }
        ProgressSink::detached().report(1, None);
    }

    #[test]
    fn test_byte_range() {
        let range = ByteRange::head(1024);
        assert_eq!(range.len(), 1024);
        assert!(!range.is_empty());
        assert!(ByteRange { start: 5, end: 5 }.is_empty());
    }
}
