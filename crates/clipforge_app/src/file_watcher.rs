// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline file watcher.
//!
//! Provides debounced change events for the timeline file so edits made
//! while the driver runs are republished to the engine.

use notify_debouncer_full::{
    new_debouncer,
    notify::{self, EventKind, RecommendedWatcher, RecursiveMode},
    DebounceEventResult, Debouncer, RecommendedCache,
};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;

/// Events emitted by the file watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// The file was created or modified
    Changed(PathBuf),
    /// The file was deleted
    Deleted(PathBuf),
    /// An error occurred
    Error(String),
}

/// Configuration for the file watcher
#[derive(Debug, Clone)]
pub struct FileWatcherConfig {
    /// Debounce duration for events
    pub debounce_duration: Duration,
}

impl Default for FileWatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(250),
        }
    }
}

/// Watches one file through its parent directory
pub struct FileWatcher {
    /// The underlying debounced watcher
    watcher: Debouncer<RecommendedWatcher, RecommendedCache>,
    /// Receiver for file events
    event_rx: Receiver<FileEvent>,
    /// Watched file
    path: PathBuf,
}

impl FileWatcher {
    /// Start watching `path`
    pub fn new(path: impl AsRef<Path>, config: FileWatcherConfig) -> Result<Self, notify::Error> {
        let path = absolute(path.as_ref());
        let (event_tx, event_rx) = mpsc::channel();
        let target = path.clone();

        let mut watcher = new_debouncer(
            config.debounce_duration,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    for event in events {
                        if !event.paths.iter().any(|p| *p == target) {
                            continue;
                        }
                        let file_event = match event.kind {
                            EventKind::Create(_) | EventKind::Modify(_) => FileEvent::Changed(target.clone()),
                            EventKind::Remove(_) => FileEvent::Deleted(target.clone()),
                            EventKind::Any | EventKind::Access(_) | EventKind::Other => continue,
                        };
                        let _ = event_tx.send(file_event);
                    }
                }
                Err(errors) => {
                    for error in errors {
                        let _ = event_tx.send(FileEvent::Error(error.to_string()));
                    }
                }
            },
        )?;

        // Editors replace files on save, so watch the directory
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!("Watching {:?} for changes", path);

        Ok(Self {
            watcher,
            event_rx,
            path,
        })
    }

    /// Poll for pending file events (non-blocking)
    pub fn poll_events(&self) -> Vec<FileEvent> {
        let mut events = Vec::new();
        loop {
            match self.event_rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("File watcher channel disconnected");
                    break;
                }
            }
        }
        events
    }

    /// Whether the file changed since the last poll
    pub fn poll_changed(&self) -> bool {
        let mut changed = false;
        for event in self.poll_events() {
            match event {
                FileEvent::Changed(path) => {
                    tracing::debug!("{:?} changed", path);
                    changed = true;
                }
                FileEvent::Deleted(path) => tracing::warn!("Timeline file {:?} was deleted", path),
                FileEvent::Error(e) => tracing::warn!("File watcher error: {}", e),
            }
        }
        changed
    }

    /// Stop watching
    pub fn stop(mut self) {
        if let Some(dir) = self.path.parent() {
            if let Err(e) = self.watcher.unwatch(dir) {
                tracing::debug!("Unwatch failed: {}", e);
            }
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = FileWatcherConfig::default();
        assert_eq!(config.debounce_duration, Duration::from_millis(250));
    }

    #[test]
    fn test_watch_existing_directory() {
        let dir = std::env::temp_dir().join(format!("clipforge-watch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("timeline.ron");

        let watcher = FileWatcher::new(&file, FileWatcherConfig::default()).unwrap();
        assert_eq!(watcher.path, file);
        assert!(watcher.poll_events().is_empty());
        watcher.stop();
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_relative_paths_are_made_absolute() {
        assert!(absolute(Path::new("timeline.ron")).is_absolute());
    }
}
