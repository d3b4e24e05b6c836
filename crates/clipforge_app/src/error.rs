// SPDX-License-Identifier: MIT OR Apache-2.0
//! Driver errors.

use clipforge_playback::PlaybackError;
use std::path::PathBuf;

/// Errors that stop the driver
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Reading or writing a file failed
    #[error("IO error on {path:?}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// A file could not be parsed
    #[error("Failed to parse {path:?}: {message}")]
    Parse {
        /// File involved
        path: PathBuf,
        /// Parser message
        message: String,
    },
    /// The engine rejected its input
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

impl AppError {
    /// Wrap an IO error with the file it concerns
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
