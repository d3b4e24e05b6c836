// SPDX-License-Identifier: MIT OR Apache-2.0
//! Local filesystem media fetcher.

use clipforge_playback::{ByteRange, FetchError, FetchRequest, MediaBytes, MediaFetcher, ProgressSink};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Default read size between progress reports
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Reads media sources from disk, resolving relative URLs against a root
#[derive(Debug, Clone)]
pub struct FsFetcher {
    root: PathBuf,
    chunk_size: usize,
}

impl FsFetcher {
    /// Create a fetcher rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the read size between progress reports
    #[cfg(test)]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Map a source URL to a file path
    pub fn resolve(&self, url: &str) -> Result<PathBuf, FetchError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return Err(FetchError::Unreachable(format!("{url}: no network transport configured")));
        }
        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(self.root.join(path))
        }
    }
}

impl MediaFetcher for FsFetcher {
    fn fetch(
        &self,
        request: FetchRequest,
        progress: ProgressSink,
    ) -> BoxFuture<'static, Result<MediaBytes, FetchError>> {
        let resolved = self.resolve(&request.url);
        let chunk_size = self.chunk_size;
        async move {
            let path = resolved?;
            tracing::trace!("Reading {:?} ({:?})", path, request.range);
            read_file(&path, request.range, chunk_size, &progress).await
        }
        .boxed()
    }
}

fn io_error(path: &Path, e: std::io::Error) -> FetchError {
    match e.kind() {
        std::io::ErrorKind::NotFound => FetchError::Status(404),
        std::io::ErrorKind::PermissionDenied => FetchError::Status(403),
        _ => FetchError::Io(format!("{}: {}", path.display(), e)),
    }
}

async fn read_file(
    path: &Path,
    range: Option<ByteRange>,
    chunk_size: usize,
    progress: &ProgressSink,
) -> Result<MediaBytes, FetchError> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| io_error(path, e))?;
    let file_len = file.metadata().await.map_err(|e| io_error(path, e))?.len();
    if file_len == 0 {
        return Err(FetchError::Undecodable(format!("{} is empty", path.display())));
    }

    let (start, end) = match range {
        Some(range) => (range.start.min(file_len), range.end.min(file_len)),
        None => (0, file_len),
    };
    if start > 0 {
        file.seek(std::io::SeekFrom::Start(start))
            .await
            .map_err(|e| io_error(path, e))?;
    }

    let total = end.saturating_sub(start);
    let mut data = Vec::with_capacity(total as usize);
    let mut chunk = vec![0u8; chunk_size];
    progress.report(0, Some(total));

    while (data.len() as u64) < total {
        let want = chunk_size.min((total - data.len() as u64) as usize);
        let read = file
            .read(&mut chunk[..want])
            .await
            .map_err(|e| io_error(path, e))?;
        if read == 0 {
            // File shrank underneath us
            break;
        }
        data.extend_from_slice(&chunk[..read]);
        progress.report(data.len() as u64, Some(total));
    }

    Ok(MediaBytes::from(data))
}
