//! Store error types

use thiserror::Error;

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a document store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Document (or the referenced leaf) does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency collision: the expected revision is no longer
    /// a live leaf. Callers re-read and retry.
    #[error("revision conflict on {id}")]
    Conflict { id: String },

    /// Transport-level failure; retried with backoff by background tasks.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Document body failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether a retry with the same inputs can ever succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Unavailable(_))
    }
}
