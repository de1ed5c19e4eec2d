//! Document store interface
//!
//! The contract the engine is written against: a key/value document store
//! with optimistic revisions and no cross-document transactions. Replicated
//! multi-writer stores may hold several divergent leaves for one id;
//! readers of a single document see one deterministic winner, while
//! conflict-aware writers read all leaves, merge, and tombstone the losers
//! in one batch.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreResult;
use crate::revision::Revision;

/// A stored document leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub rev: Revision,
    pub body: Value,
    pub deleted: bool,
}

impl Document {
    /// Deserialize the body into a typed value.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// One write of an atomic batch.
#[derive(Debug, Clone)]
pub struct BulkWrite {
    pub id: String,
    /// Revision the write is based on; `None` creates a new document.
    pub expected: Option<Revision>,
    pub body: Value,
    /// Tombstone the leaf instead of replacing its content.
    pub delete: bool,
}

impl BulkWrite {
    pub fn put(id: impl Into<String>, expected: Option<Revision>, body: Value) -> Self {
        Self {
            id: id.into(),
            expected,
            body,
            delete: false,
        }
    }

    pub fn tombstone(id: impl Into<String>, rev: Revision) -> Self {
        Self {
            id: id.into(),
            expected: Some(rev),
            body: Value::Null,
            delete: true,
        }
    }
}

/// Backend-agnostic document store.
///
/// All methods are suspension points; implementations must not hold locks
/// across awaits visible to callers. Writes are durable when the method
/// returns.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// The winning live leaf for `id`, if the document exists. The winner
    /// is deterministic across readers (highest revision, ties broken
    /// lexicographically) so concurrent readers agree.
    async fn get(&self, id: &str) -> StoreResult<Option<Document>>;

    /// Every live conflict leaf for `id`. More than one entry means
    /// concurrent writers diverged; this is an expected state, not an
    /// error.
    async fn get_leaves(&self, id: &str) -> StoreResult<Vec<Document>>;

    /// Create (`expected = None`) or replace (`expected = Some`) a leaf.
    /// Fails with `Conflict` when the expectation is stale.
    async fn put(&self, id: &str, expected: Option<&Revision>, body: Value)
        -> StoreResult<Revision>;

    /// Apply a batch of writes atomically: either every precondition holds
    /// and all writes land, or none do and the call fails with `Conflict`.
    /// This is what lets a merge persist its winner and tombstone the
    /// losing leaves as a unit.
    async fn bulk(&self, writes: Vec<BulkWrite>) -> StoreResult<Vec<Revision>>;

    /// Winning live leaves of all documents whose id starts with `prefix`.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<Document>>;
}
