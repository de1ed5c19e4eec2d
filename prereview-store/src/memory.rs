//! In-memory store backend
//!
//! Reference implementation of [`DocumentStore`] used by tests and the CLI.
//! Honors the full contract: CAS puts, atomic bulk batches, deterministic
//! winners among conflict leaves. `force_leaf` injects a divergent sibling
//! the way multi-master replication would, so merge paths can be exercised
//! without a replicated deployment.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::revision::Revision;
use crate::traits::{BulkWrite, Document, DocumentStore};

#[derive(Debug, Clone)]
struct Leaf {
    rev: Revision,
    body: Value,
    deleted: bool,
}

/// In-memory document store.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, Vec<Leaf>>>,
    /// Simulates a transport outage: every operation fails with
    /// `Unavailable` while set.
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated unavailability (testing hook).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("store offline".to_string()))
        } else {
            Ok(())
        }
    }

    /// Inject an additional live leaf for `id`, bypassing CAS. This is the
    /// replication stand-in: after it, `get_leaves` reports divergence that
    /// only a conflict-aware merge resolves.
    pub async fn force_leaf(&self, id: &str, body: Value) -> StoreResult<Revision> {
        self.check_online()?;
        let rev = Revision::first(&body);
        let mut docs = self.docs.write().await;
        let leaves = docs.entry(id.to_string()).or_default();
        if leaves.iter().any(|leaf| leaf.rev == rev) {
            return Err(StoreError::Conflict { id: id.to_string() });
        }
        leaves.push(Leaf {
            rev: rev.clone(),
            body,
            deleted: false,
        });
        debug!(doc_id = id, rev = %rev, leaves = leaves.len(), "forced conflict leaf");
        Ok(rev)
    }

    /// Number of live leaves for `id` (testing hook).
    pub async fn live_leaf_count(&self, id: &str) -> usize {
        let docs = self.docs.read().await;
        docs.get(id)
            .map(|leaves| leaves.iter().filter(|leaf| !leaf.deleted).count())
            .unwrap_or(0)
    }

    fn winner(leaves: &[Leaf]) -> Option<&Leaf> {
        leaves
            .iter()
            .filter(|leaf| !leaf.deleted)
            .max_by(|a, b| {
                a.rev
                    .generation()
                    .cmp(&b.rev.generation())
                    .then_with(|| a.rev.as_str().cmp(b.rev.as_str()))
            })
    }

    fn apply_write(
        docs: &mut HashMap<String, Vec<Leaf>>,
        write: &BulkWrite,
    ) -> StoreResult<Revision> {
        let leaves = docs.entry(write.id.clone()).or_default();

        match &write.expected {
            None => {
                if write.delete {
                    return Err(StoreError::NotFound(write.id.clone()));
                }
                if leaves.iter().any(|leaf| !leaf.deleted) {
                    return Err(StoreError::Conflict { id: write.id.clone() });
                }
                let rev = Revision::first(&write.body);
                leaves.push(Leaf {
                    rev: rev.clone(),
                    body: write.body.clone(),
                    deleted: false,
                });
                Ok(rev)
            }
            Some(expected) => {
                let Some(leaf) = leaves
                    .iter_mut()
                    .find(|leaf| !leaf.deleted && &leaf.rev == expected)
                else {
                    return Err(StoreError::Conflict { id: write.id.clone() });
                };
                let rev = expected.next(&write.body);
                leaf.rev = rev.clone();
                leaf.body = write.body.clone();
                leaf.deleted = write.delete;
                Ok(rev)
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, id: &str) -> StoreResult<Option<Document>> {
        self.check_online()?;
        let docs = self.docs.read().await;
        Ok(docs.get(id).and_then(|leaves| {
            Self::winner(leaves).map(|leaf| Document {
                id: id.to_string(),
                rev: leaf.rev.clone(),
                body: leaf.body.clone(),
                deleted: false,
            })
        }))
    }

    async fn get_leaves(&self, id: &str) -> StoreResult<Vec<Document>> {
        self.check_online()?;
        let docs = self.docs.read().await;
        Ok(docs
            .get(id)
            .map(|leaves| {
                leaves
                    .iter()
                    .filter(|leaf| !leaf.deleted)
                    .map(|leaf| Document {
                        id: id.to_string(),
                        rev: leaf.rev.clone(),
                        body: leaf.body.clone(),
                        deleted: false,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn put(
        &self,
        id: &str,
        expected: Option<&Revision>,
        body: Value,
    ) -> StoreResult<Revision> {
        self.check_online()?;
        let mut docs = self.docs.write().await;
        Self::apply_write(
            &mut docs,
            &BulkWrite {
                id: id.to_string(),
                expected: expected.cloned(),
                body,
                delete: false,
            },
        )
    }

    async fn bulk(&self, writes: Vec<BulkWrite>) -> StoreResult<Vec<Revision>> {
        self.check_online()?;
        let mut docs = self.docs.write().await;

        // validate every precondition before touching anything
        for write in &writes {
            match &write.expected {
                None => {
                    if write.delete {
                        return Err(StoreError::NotFound(write.id.clone()));
                    }
                    let has_live = docs
                        .get(&write.id)
                        .map(|leaves| leaves.iter().any(|leaf| !leaf.deleted))
                        .unwrap_or(false);
                    if has_live {
                        return Err(StoreError::Conflict { id: write.id.clone() });
                    }
                }
                Some(expected) => {
                    let holds = docs
                        .get(&write.id)
                        .map(|leaves| {
                            leaves.iter().any(|leaf| !leaf.deleted && &leaf.rev == expected)
                        })
                        .unwrap_or(false);
                    if !holds {
                        return Err(StoreError::Conflict { id: write.id.clone() });
                    }
                }
            }
        }

        let mut revs = Vec::with_capacity(writes.len());
        for write in &writes {
            revs.push(Self::apply_write(&mut docs, write)?);
        }
        debug!(count = revs.len(), "applied bulk batch");
        Ok(revs)
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<Document>> {
        self.check_online()?;
        let docs = self.docs.read().await;
        let mut result: Vec<Document> = docs
            .iter()
            .filter(|(id, _)| id.starts_with(prefix))
            .filter_map(|(id, leaves)| {
                Self::winner(leaves).map(|leaf| Document {
                    id: id.clone(),
                    rev: leaf.rev.clone(),
                    body: leaf.body.clone(),
                    deleted: false,
                })
            })
            .collect();
        result.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryStore::new();
        let rev = store.put("doc:1", None, json!({"a": 1})).await.unwrap();

        let doc = store.get("doc:1").await.unwrap().unwrap();
        assert_eq!(doc.rev, rev);
        assert_eq!(doc.body, json!({"a": 1}));

        assert!(store.get("doc:2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_put_conflicts() {
        let store = MemoryStore::new();
        let first = store.put("doc:1", None, json!({"a": 1})).await.unwrap();
        store
            .put("doc:1", Some(&first), json!({"a": 2}))
            .await
            .unwrap();

        // writing against the superseded revision fails
        let result = store.put("doc:1", Some(&first), json!({"a": 3})).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));

        // creating over an existing document fails too
        let result = store.put("doc:1", None, json!({"a": 4})).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_forced_leaves_diverge() {
        let store = MemoryStore::new();
        store.put("doc:1", None, json!({"branch": "a"})).await.unwrap();
        store.force_leaf("doc:1", json!({"branch": "b"})).await.unwrap();

        let leaves = store.get_leaves("doc:1").await.unwrap();
        assert_eq!(leaves.len(), 2);
        assert_eq!(store.live_leaf_count("doc:1").await, 2);

        // single-document readers still see exactly one deterministic winner
        let w1 = store.get("doc:1").await.unwrap().unwrap();
        let w2 = store.get("doc:1").await.unwrap().unwrap();
        assert_eq!(w1.rev, w2.rev);
    }

    #[tokio::test]
    async fn test_bulk_is_atomic() {
        let store = MemoryStore::new();
        let rev = store.put("doc:1", None, json!({"a": 1})).await.unwrap();

        // second write's precondition is stale, so nothing may land
        let stale = Revision::first(&json!({"other": true}));
        let result = store
            .bulk(vec![
                BulkWrite::put("doc:1", Some(rev.clone()), json!({"a": 2})),
                BulkWrite::put("doc:2", Some(stale), json!({"b": 1})),
            ])
            .await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));

        let doc = store.get("doc:1").await.unwrap().unwrap();
        assert_eq!(doc.body, json!({"a": 1}));
        assert!(store.get("doc:2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bulk_tombstones_losing_leaves() {
        let store = MemoryStore::new();
        let winner_rev = store.put("doc:1", None, json!({"branch": "a"})).await.unwrap();
        let loser_rev = store.force_leaf("doc:1", json!({"branch": "b"})).await.unwrap();

        store
            .bulk(vec![
                BulkWrite::put("doc:1", Some(winner_rev), json!({"merged": true})),
                BulkWrite::tombstone("doc:1", loser_rev),
            ])
            .await
            .unwrap();

        assert_eq!(store.live_leaf_count("doc:1").await, 1);
        let doc = store.get("doc:1").await.unwrap().unwrap();
        assert_eq!(doc.body, json!({"merged": true}));
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let store = MemoryStore::new();
        store.put("preprint:a", None, json!({"n": 1})).await.unwrap();
        store.put("preprint:b", None, json!({"n": 2})).await.unwrap();
        store.put("review:x", None, json!({"n": 3})).await.unwrap();

        let docs = store.list("preprint:").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "preprint:a");
        assert_eq!(docs[1].id, "preprint:b");
    }

    #[tokio::test]
    async fn test_offline_simulation() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.get("doc:1").await,
            Err(StoreError::Unavailable(_))
        ));

        store.set_offline(false);
        assert!(store.get("doc:1").await.unwrap().is_none());
    }
}
