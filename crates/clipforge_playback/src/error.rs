// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error and warning types for the playback engine.
//!
//! Only configuration and capacity problems reach the caller as errors.
//! Media and seek trouble degrades playback and is reported as a
//! [`PlaybackWarning`] instead.

use clipforge_timeline::{ClipId, TimelineError};
use thiserror::Error;

/// Errors surfaced to callers of the engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    /// The buffer budget is exhausted and nothing can be evicted
    #[error("Buffer capacity exceeded: request for {url} denied")]
    BufferCapacityExceeded {
        /// URL whose request was denied
        url: String,
    },

    /// Engine configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Timeline rejected at the model boundary
    #[error(transparent)]
    Timeline(#[from] TimelineError),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, PlaybackError>;

/// Failures of the network/storage layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Source could not be reached
    #[error("Source unreachable: {0}")]
    Unreachable(String),
    /// Bytes arrived but cannot be used
    #[error("Source undecodable: {0}")]
    Undecodable(String),
    /// Remote answered with an error status
    #[error("Remote returned status {0}")]
    Status(u16),
    /// Local IO failure
    #[error("IO error: {0}")]
    Io(String),
    /// Request was cancelled before completion
    #[error("Request cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether trying again could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Io(_) => true,
            Self::Status(code) => *code >= 500 || *code == 408 || *code == 429,
            Self::Undecodable(_) | Self::Cancelled => false,
        }
    }
}

/// Non-fatal problems observed during playback
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackWarning {
    /// A clip's media could not be loaded; it holds its last good frame
    MediaLoad {
        /// Affected clip
        clip: ClipId,
        /// Media source
        url: String,
        /// What went wrong
        reason: String,
    },
    /// A seek did not settle in time and was completed with degraded clips
    SeekTimeout {
        /// Requested position
        target_ms: f64,
        /// How long the engine waited
        waited_ms: f64,
    },
    /// Prefetch of a source was refused because the buffer is full
    CapacityExceeded {
        /// Refused source
        url: String,
    },
}

impl std::fmt::Display for PlaybackWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MediaLoad { url, reason, .. } => write!(f, "Media load failed for {url}: {reason}"),
            Self::SeekTimeout { target_ms, waited_ms } => {
                write!(f, "Seek to {target_ms}ms timed out after {waited_ms}ms")
            }
            Self::CapacityExceeded { url } => write!(f, "Buffer full, prefetch of {url} refused"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::Unreachable("dns".into()).is_retryable());
        assert!(FetchError::Status(503).is_retryable());
        assert!(FetchError::Status(429).is_retryable());
        assert!(!FetchError::Status(404).is_retryable());
        assert!(!FetchError::Undecodable("bad header".into()).is_retryable());
        assert!(!FetchError::Cancelled.is_retryable());
    }

    #[test]
    fn test_timeline_error_converts() {
        let err: PlaybackError = TimelineError::InvalidDuration(-1.0).into();
        assert!(matches!(err, PlaybackError::Timeline(_)));
    }
}
