//! Engine error taxonomy
//!
//! Surfaced errors only. Optimistic-concurrency conflicts are retried
//! inside the store/db layer and never appear here; after bounded retries
//! they degrade to `StoreUnavailable`.

use thiserror::Error;

/// Engine result type
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced to action-posting callers.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed or unrecognized action payload. Not retried.
    #[error("invalid action: {reason}")]
    InvalidAction { reason: String },

    /// ACL or moderation gate failed. Not retried.
    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    /// A referenced user, role, action or preprint does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The document store could not complete a request-path write, or an
    /// internal retry loop exhausted its attempts.
    #[error("store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    /// A persisted document failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidAction { reason: reason.into() }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden { reason: reason.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable { reason: reason.into() }
    }
}
