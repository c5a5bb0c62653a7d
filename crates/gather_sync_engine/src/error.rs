//! Error types for the sync engine.

use thiserror::Error;
use uuid::Uuid;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// The server rejected the request definitively (validation, auth).
    /// Terminal for the item that triggered it; never auto-retried.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Malformed payload. Aborts the whole pull batch; local state is
    /// left untouched and the previous cache token is retained.
    #[error("malformed payload: {0}")]
    Decode(String),

    /// A referenced record is missing from the local store.
    #[error("record not found: {0}")]
    NotFound(Uuid),

    /// The local store failed to read or commit.
    #[error("store error: {0}")]
    Store(String),

    /// Sync was cancelled by the caller.
    #[error("sync cancelled")]
    Cancelled,

    /// Invalid engine state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
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

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}
