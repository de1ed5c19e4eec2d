//! Preprint index repository
//!
//! Typed access to the materialized index documents, including the
//! conflict-leaf reads and atomic winner-plus-tombstones commits the fold
//! depends on. All revisions are surfaced to callers: every write here is
//! optimistic and may be raced.

use std::sync::Arc;

use prereview_core::types::{PreprintId, PreprintIndexDoc};
use prereview_core::EngineResult;
use prereview_store::{BulkWrite, DocumentStore, Revision, StoreResult};
use tracing::debug;

use crate::db::store_err;

#[derive(Clone)]
pub struct IndexRepo {
    store: Arc<dyn DocumentStore>,
}

impl IndexRepo {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: &PreprintId) -> EngineResult<Option<PreprintIndexDoc>> {
        let doc = self.store.get(id.as_str()).await.map_err(store_err)?;
        doc.map(|doc| doc.parse().map_err(store_err)).transpose()
    }

    /// Every live conflict leaf of one index document, with its revision.
    /// Multiple entries mean concurrent writers diverged; the fold merges
    /// them forward.
    pub async fn leaves(
        &self,
        id: &PreprintId,
    ) -> StoreResult<Vec<(Revision, PreprintIndexDoc)>> {
        let docs = self.store.get_leaves(id.as_str()).await?;
        docs.into_iter()
            .map(|doc| Ok((doc.rev.clone(), doc.parse()?)))
            .collect()
    }

    /// Create the first version of an index document.
    pub async fn create(&self, doc: &PreprintIndexDoc) -> StoreResult<Revision> {
        let body = serde_json::to_value(doc)?;
        self.store.put(doc.id().as_str(), None, body).await
    }

    /// Persist a merged winner and tombstone the losing leaves in one
    /// atomic batch. `base` is the leaf the winner replaces.
    pub async fn commit_merge(
        &self,
        doc: &PreprintIndexDoc,
        base: Revision,
        losers: Vec<Revision>,
    ) -> StoreResult<Revision> {
        let id = doc.id().as_str();
        let mut writes = vec![BulkWrite::put(id, Some(base), serde_json::to_value(doc)?)];
        let tombstoned = losers.len();
        for rev in losers {
            writes.push(BulkWrite::tombstone(id, rev));
        }

        let mut revs = self.store.bulk(writes).await?;
        debug!(doc_id = id, tombstoned, "committed merged index document");
        if revs.is_empty() {
            return Err(prereview_store::StoreError::Unavailable(
                "bulk commit returned no revisions".to_string(),
            ));
        }
        Ok(revs.remove(0))
    }

    /// CAS-replace one index document (rescore sweep path).
    pub async fn update(
        &self,
        doc: &PreprintIndexDoc,
        expected: &Revision,
    ) -> StoreResult<Revision> {
        let body = serde_json::to_value(doc)?;
        self.store.put(doc.id().as_str(), Some(expected), body).await
    }

    /// Winning leaf of one document with its revision.
    pub async fn get_with_rev(
        &self,
        id: &PreprintId,
    ) -> StoreResult<Option<(Revision, PreprintIndexDoc)>> {
        let doc = self.store.get(id.as_str()).await?;
        doc.map(|doc| Ok((doc.rev.clone(), doc.parse()?))).transpose()
    }

    /// All index documents whose *last computed* score is at or above the
    /// floor. Documents that already decayed below it are assumed to stay
    /// there, which bounds the sweep to the active set.
    pub async fn by_min_score(
        &self,
        floor: f64,
    ) -> StoreResult<Vec<(Revision, PreprintIndexDoc)>> {
        let docs = self.store.list("preprint:").await?;
        let mut result = Vec::new();
        for doc in docs {
            let parsed: PreprintIndexDoc = doc.parse()?;
            if parsed.score >= floor {
                result.push((doc.rev, parsed));
            }
        }
        Ok(result)
    }

    /// All live index documents (search path).
    pub async fn all(&self) -> EngineResult<Vec<PreprintIndexDoc>> {
        let docs = self.store.list("preprint:").await.map_err(store_err)?;
        docs.into_iter()
            .map(|doc| doc.parse().map_err(store_err))
            .collect()
    }
}
