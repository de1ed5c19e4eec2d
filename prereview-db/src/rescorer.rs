//! Rescore sweep
//!
//! Scores decay with time even when nothing is written, so a background
//! task periodically recomputes them. The sweep covers only documents whose
//! last computed score is at or above the relevance floor: anything already
//! below it can only sink further, which bounds each sweep to the active
//! set. This is the one place application state changes without a
//! corresponding action.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use prereview_core::constants::{DEFAULT_RESCORE_INTERVAL_SECS, MAX_SWEEP_ATTEMPTS};
use prereview_core::score::{score, ScoreConfig};
use prereview_core::types::PreprintIndexDoc;
use prereview_core::EngineResult;
use prereview_store::{with_retry, RetryPolicy, Revision, StoreError, StoreResult};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::db::store_err;
use crate::repos::IndexRepo;

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RescoreOutcome {
    /// Documents at or above the floor when the sweep started.
    pub swept: usize,
    /// Documents rewritten with a fresh score.
    pub updated: usize,
    /// Documents that could not be rewritten within the attempt budget.
    pub failed: usize,
}

pub struct Rescorer {
    index: IndexRepo,
    config: ScoreConfig,
    interval: Duration,
    retry: RetryPolicy,
}

impl Rescorer {
    pub fn new(index: IndexRepo, config: ScoreConfig) -> Self {
        Self {
            index,
            config,
            interval: Duration::from_secs(DEFAULT_RESCORE_INTERVAL_SECS),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run one sweep with `now` as the reference time for every document.
    pub async fn run_once(&self, now: DateTime<Utc>) -> EngineResult<RescoreOutcome> {
        let candidates = with_retry(&self.retry, "rescore query", || async move {
            self.index.by_min_score(self.config.threshold).await
        })
        .await
        .map_err(store_err)?;

        let mut outcome = RescoreOutcome {
            swept: candidates.len(),
            ..Default::default()
        };

        for (rev, doc) in candidates {
            match self.rescore_doc(rev, doc, now).await {
                Ok(()) => outcome.updated += 1,
                Err(err) => {
                    outcome.failed += 1;
                    warn!(error = %err, "sweep failed to rewrite document");
                }
            }
        }

        info!(
            swept = outcome.swept,
            updated = outcome.updated,
            failed = outcome.failed,
            "rescore sweep complete"
        );
        Ok(outcome)
    }

    /// Rewrite one document's score, racing fairly with in-flight folds: on
    /// a conflict the fresh winner is re-read and rescored, so whichever
    /// write lands last carries a score consistent with its own action set.
    async fn rescore_doc(
        &self,
        rev: Revision,
        doc: PreprintIndexDoc,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut rev = rev;
        let mut doc = doc;

        for attempt in 1..=MAX_SWEEP_ATTEMPTS {
            doc.score = score(&doc.potential_action, now, &self.config);
            doc.date_score_last_updated = now;

            match self.index.update(&doc, &rev).await {
                Ok(_) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < MAX_SWEEP_ATTEMPTS => {
                    let delay = self.retry.delay(attempt + 1);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    match self.index.get_with_rev(doc.id()).await? {
                        Some((fresh_rev, fresh_doc)) => {
                            rev = fresh_rev;
                            doc = fresh_doc;
                        }
                        // document disappeared under us; nothing to rescore
                        None => return Ok(()),
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(StoreError::Conflict {
            id: doc.id().as_str().to_string(),
        })
    }

    /// Start the periodic sweep. A single task owns the loop, so sweeps are
    /// serialized with themselves; an overrunning sweep delays the next
    /// tick instead of overlapping it.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick fires immediately; skip it so spawning is not
            // itself a sweep
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let now = Utc::now();
                if let Err(err) = self.run_once(now).await {
                    error!(error = %err, "rescore sweep failed");
                }
            }
        })
    }
}
