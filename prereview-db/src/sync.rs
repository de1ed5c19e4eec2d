//! Index synchronizer: the conflict-aware fold
//!
//! Folds one stored review/request action into the preprint index document
//! for its preprint, exactly once, while other writers may be doing the
//! same concurrently. The store may hold several divergent leaves of the
//! document; the fold merges them all forward, appends the action if it is
//! not already present, and commits the winner while tombstoning the losers
//! in one atomic batch. A racing writer makes the commit fail with a
//! conflict, in which case the whole fold restarts from the read step.

use chrono::{DateTime, Utc};
use prereview_core::constants::MAX_FOLD_ATTEMPTS;
use prereview_core::score::{score, ScoreConfig};
use prereview_core::types::{Action, IndexedAction, PreprintId, PreprintIndexDoc, PreprintMeta};
use prereview_core::{EngineError, EngineResult};
use prereview_store::{RetryPolicy, StoreResult};
use tracing::{debug, info, warn};

use crate::db::store_err;
use crate::repos::IndexRepo;

pub struct IndexSynchronizer {
    index: IndexRepo,
    config: ScoreConfig,
    retry: RetryPolicy,
}

impl IndexSynchronizer {
    pub fn new(index: IndexRepo, config: ScoreConfig) -> Self {
        Self {
            index,
            config,
            retry: RetryPolicy::default().with_max_attempts(MAX_FOLD_ATTEMPTS),
        }
    }

    /// Fold `action` into its preprint's index document at reference time
    /// `now`. Returns the resulting document. Safe to call more than once
    /// with the same action: a replay merges but appends nothing.
    pub async fn fold(&self, action: &Action, now: DateTime<Utc>) -> EngineResult<PreprintIndexDoc> {
        let compacted = action.compact().ok_or_else(|| {
            EngineError::invalid(format!("{} actions are not indexed", action.action_type))
        })?;
        let meta = action.object.as_preprint().ok_or_else(|| {
            EngineError::invalid("indexed action carries no preprint object")
        })?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fold_once(&meta.id, meta, &compacted, now).await {
                Ok(doc) => {
                    debug!(
                        action_id = %compacted.id,
                        doc_id = %meta.id,
                        attempt,
                        actions = doc.potential_action.len(),
                        "folded action into index"
                    );
                    return Ok(doc);
                }
                Err(err) if err.is_retryable() && attempt < MAX_FOLD_ATTEMPTS => {
                    warn!(
                        action_id = %compacted.id,
                        doc_id = %meta.id,
                        attempt,
                        error = %err,
                        "index fold raced, retrying"
                    );
                    let delay = self.retry.delay(attempt + 1);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => return Err(store_err(err)),
            }
        }
    }

    /// One attempt: read all leaves, merge, append, commit.
    async fn fold_once(
        &self,
        id: &PreprintId,
        action_meta: &PreprintMeta,
        compacted: &IndexedAction,
        now: DateTime<Utc>,
    ) -> StoreResult<PreprintIndexDoc> {
        let mut leaves = self.index.leaves(id).await?;

        if leaves.is_empty() {
            let doc = PreprintIndexDoc {
                meta: action_meta.clone(),
                score: score(std::slice::from_ref(compacted), now, &self.config),
                date_score_last_updated: now,
                potential_action: vec![compacted.clone()],
            };
            self.index.create(&doc).await?;
            info!(doc_id = %id, "created index document");
            return Ok(doc);
        }

        let (base, first) = leaves.remove(0);
        let (losers, mut merged) = merge_leaves(first, leaves);

        // the incoming action's own resolved object competes for the
        // metadata slot under the same preference rule as the branches
        if action_meta.wins_over(&merged.meta) {
            merged.meta = action_meta.clone();
        }

        if !merged.contains_action(&compacted.id) {
            merged.potential_action.push(compacted.clone());
            // rescore at the document's previous reference time so the
            // denominators of existing contributions stay aligned; the
            // sweep trues the whole document up later
            merged.score = score(
                &merged.potential_action,
                merged.date_score_last_updated,
                &self.config,
            );
            merged.date_score_last_updated = now;
        }

        self.index.commit_merge(&merged, base, losers).await?;
        Ok(merged)
    }
}

/// Merge divergent leaves into a single candidate document, starting from
/// `first`. Returns the revisions to tombstone and the candidate. The
/// policy is deterministic and order independent:
/// - score and its timestamp travel as a pair; the later timestamp wins
/// - denormalized metadata goes to the branch with the larger retrieved
///   field set, ties broken by later retrieval date
/// - the action set is a union keyed by action id
fn merge_leaves(
    first: PreprintIndexDoc,
    rest: Vec<(prereview_store::Revision, PreprintIndexDoc)>,
) -> (Vec<prereview_store::Revision>, PreprintIndexDoc) {
    let mut losers = Vec::new();
    let mut merged = first;

    for (rev, doc) in rest {
        if doc.date_score_last_updated > merged.date_score_last_updated {
            merged.score = doc.score;
            merged.date_score_last_updated = doc.date_score_last_updated;
        }

        if doc.meta.wins_over(&merged.meta) {
            merged.meta = doc.meta;
        }

        for action in doc.potential_action {
            if !merged.contains_action(&action.id) {
                merged.potential_action.push(action);
            }
        }

        losers.push(rev);
    }

    (losers, merged)
}
