//! Engine constants
//!
//! Defaults and limits shared across the workspace. Anything a deployment
//! may want to tune lives in a config struct seeded from these.

// ============================================================================
// Scoring defaults
// ============================================================================

/// Relevance floor: index documents whose last computed score sits below
/// this are treated as inactive and skipped by the rescore sweep.
pub const SCORE_THRESHOLD: f64 = 0.01;

/// Weight of a review action in the score.
pub const DEFAULT_REVIEW_WEIGHT: f64 = 1.0;

/// Weight of a request-for-review action in the score.
pub const DEFAULT_REQUEST_WEIGHT: f64 = 0.5;

/// Days for an action's score contribution to halve.
pub const DEFAULT_HALF_LIFE_DAYS: f64 = 7.0;

// ============================================================================
// Synchronization / sweep
// ============================================================================

/// Seconds between rescore sweeps.
pub const DEFAULT_RESCORE_INTERVAL_SECS: u64 = 300;

/// Bounded attempts for an index fold before it surfaces as unavailable.
pub const MAX_FOLD_ATTEMPTS: u32 = 5;

/// Bounded attempts for a single document write in the rescore sweep.
pub const MAX_SWEEP_ATTEMPTS: u32 = 3;

// ============================================================================
// Identifier prefixes
// ============================================================================

pub const ROLE_PREFIX: &str = "role:";
pub const USER_PREFIX: &str = "user:";
pub const PREPRINT_PREFIX: &str = "preprint:";
pub const REVIEW_PREFIX: &str = "review:";
pub const REQUEST_PREFIX: &str = "request:";
pub const QUESTION_PREFIX: &str = "question:";
pub const DOI_PREFIX: &str = "doi:";
pub const ARXIV_PREFIX: &str = "arXiv:";
