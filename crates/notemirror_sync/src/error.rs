//! Error types for the sync engine.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote store throttled the request.
    ///
    /// The engine never retries on its own; the caller decides when to run
    /// the sync again.
    #[error("rate limit reached, retry in {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds the caller must wait before retrying.
        retry_after_secs: u64,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Protocol error (invalid message or chunk sequence).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Server rejected the request.
    #[error("server error: {0}")]
    ServerError(String),

    /// Local filesystem failure. The archive cannot be trusted.
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Metadata could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// An entity identifier cannot be used as a cache file name.
    #[error("invalid entity id: {0:?}")]
    InvalidId(String),

    /// Another process holds the archive lock.
    #[error("archive is locked by another process")]
    ArchiveLocked,

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Creates a rate-limit error.
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a filesystem error for `path`.
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this error can be retried by running the sync again.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::RateLimited { .. } => true,
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::ServerError(_) => true,
            _ => false,
        }
    }

    /// Returns the back-off the remote store asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

/// Attaches a path to I/O errors.
pub(crate) trait IoResultExt<T> {
    fn at_path(self, path: &std::path::Path) -> SyncResult<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at_path(self, path: &std::path::Path) -> SyncResult<T> {
        self.map_err(|e| SyncError::filesystem(path, e))
    }
}
