//! Time-decayed activity score
//!
//! The score of a preprint is the sum of its actions' contributions, each
//! weighted by type and halved every `half_life_days` of age. Reviews are a
//! heavier signal than requests. The function is pure: callers pass the
//! reference time, so incremental folds and the periodic sweep both get
//! reproducible numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_HALF_LIFE_DAYS, DEFAULT_REQUEST_WEIGHT, DEFAULT_REVIEW_WEIGHT, SCORE_THRESHOLD,
};
use crate::error::{EngineError, EngineResult};
use crate::types::action::{ActionType, IndexedAction};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Tunable scoring constants. These are configuration, not protocol: deploys
/// may weight signals differently or decay faster without touching the fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreConfig {
    pub review_weight: f64,
    pub request_weight: f64,
    pub half_life_days: f64,
    /// Relevance floor: preprints whose last computed score is below this
    /// are considered inactive and skipped by the rescore sweep.
    pub threshold: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            review_weight: DEFAULT_REVIEW_WEIGHT,
            request_weight: DEFAULT_REQUEST_WEIGHT,
            half_life_days: DEFAULT_HALF_LIFE_DAYS,
            threshold: SCORE_THRESHOLD,
        }
    }
}

impl ScoreConfig {
    /// Reject configurations that would break scoring invariants (negative
    /// or zero decay, request outweighing review).
    pub fn validate(&self) -> EngineResult<()> {
        if !self.half_life_days.is_finite() || self.half_life_days <= 0.0 {
            return Err(EngineError::invalid("half_life_days must be positive"));
        }
        if self.review_weight < 0.0 || self.request_weight < 0.0 {
            return Err(EngineError::invalid("weights must be non-negative"));
        }
        if self.review_weight < self.request_weight {
            return Err(EngineError::invalid(
                "review_weight must be at least request_weight",
            ));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(EngineError::invalid("threshold must be non-negative"));
        }
        Ok(())
    }

    pub fn weight(&self, action_type: ActionType) -> f64 {
        match action_type {
            ActionType::Review => self.review_weight,
            ActionType::Request => self.request_weight,
            _ => 0.0,
        }
    }
}

/// Score an action set at reference time `now`.
///
/// Non-negative; grows with the number of actions; decays monotonically as
/// `now` advances; independent of action order. Actions stamped in the
/// future contribute their full weight (age clamps at zero) so clock skew
/// between writers never produces a blow-up.
pub fn score(actions: &[IndexedAction], now: DateTime<Utc>, config: &ScoreConfig) -> f64 {
    actions
        .iter()
        .map(|action| {
            let age_days =
                ((now - action.start_time).num_milliseconds() as f64 / MILLIS_PER_DAY).max(0.0);
            config.weight(action.action_type) * 0.5_f64.powf(age_days / config.half_life_days)
        })
        .sum()
}
