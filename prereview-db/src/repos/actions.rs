//! Action document repository
//!
//! One document per accepted action, keyed by the action identifier.
//! Review/request identifiers are deterministic in (agent, preprint), so a
//! repost lands on the same key and overwrites instead of duplicating.

use std::sync::Arc;

use prereview_core::types::{Action, ActionId, PreprintId};
use prereview_core::{EngineError, EngineResult};
use prereview_store::{with_retry, DocumentStore, RetryPolicy, StoreError};
use tracing::debug;

use crate::db::store_err;

#[derive(Clone)]
pub struct ActionRepo {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl ActionRepo {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Insert or overwrite the document at the action's identifier.
    pub async fn upsert(&self, action: &Action) -> EngineResult<()> {
        let body = &serde_json::to_value(action)?;
        let id = action.id.as_str();

        with_retry(&self.retry, "action upsert", || async move {
            let current = self.store.get(id).await?;
            let expected = current.map(|doc| doc.rev);
            self.store.put(id, expected.as_ref(), body.clone()).await?;
            Ok(())
        })
        .await
        .map_err(store_err)?;

        debug!(action_id = %action.id, action_type = %action.action_type, "stored action");
        Ok(())
    }

    pub async fn get(&self, id: &ActionId) -> EngineResult<Option<Action>> {
        let doc = self.store.get(id.as_str()).await.map_err(store_err)?;
        doc.map(|doc| doc.parse().map_err(store_err)).transpose()
    }

    pub async fn require(&self, id: &ActionId) -> EngineResult<Action> {
        self.get(id)
            .await?
            .ok_or_else(|| EngineError::not_found(id.as_str()))
    }

    /// Read-modify-write under optimistic concurrency. Used for appending
    /// moderation sub-actions; the mutation is re-applied to a fresh read
    /// when a racing writer wins.
    pub async fn update_with<F>(&self, id: &ActionId, mutate: F) -> EngineResult<Action>
    where
        F: Fn(&mut Action),
    {
        let mutate = &mutate;
        with_retry(&self.retry, "action update", || async move {
            let doc = self
                .store
                .get(id.as_str())
                .await?
                .ok_or_else(|| StoreError::NotFound(id.as_str().to_string()))?;
            let mut action: Action = doc.parse()?;
            mutate(&mut action);
            let body = serde_json::to_value(&action)?;
            self.store.put(id.as_str(), Some(&doc.rev), body).await?;
            Ok(action)
        })
        .await
        .map_err(store_err)
    }

    /// All stored review/request actions (the indexed types).
    pub async fn list_indexed(&self) -> EngineResult<Vec<Action>> {
        let mut actions = Vec::new();
        for prefix in ["review:", "request:"] {
            for doc in self.store.list(prefix).await.map_err(store_err)? {
                actions.push(doc.parse::<Action>().map_err(store_err)?);
            }
        }
        Ok(actions)
    }

    /// Stored review/request actions referencing a preprint.
    pub async fn list_by_preprint(&self, preprint: &PreprintId) -> EngineResult<Vec<Action>> {
        let actions = self.list_indexed().await?;
        Ok(actions
            .into_iter()
            .filter(|action| {
                action
                    .object
                    .as_preprint()
                    .map(|meta| &meta.id == preprint)
                    .unwrap_or(false)
            })
            .collect())
    }
}
