//! Bounded retry with exponential backoff
//!
//! Conflicts and transport failures are retried a bounded number of times;
//! the last error is returned once attempts run out. Jitter keeps
//! concurrent retriers from re-colliding in lockstep.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{StoreError, StoreResult};

/// Retry policy: attempt count and backoff shape.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Fraction of the delay added as jitter (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 10,
            max_delay_ms: 1_000,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay before the given 1-indexed retry attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(0);
        }
        let base = self.initial_delay_ms as f64
            * self.multiplier.powi(attempt.saturating_sub(2) as i32);
        let capped = base.min(self.max_delay_ms as f64);
        let jittered = capped + capped * self.jitter * jitter_factor();
        Duration::from_millis(jittered as u64)
    }
}

/// Pseudo-random jitter in [0, 1) from the clock's subsecond nanos.
fn jitter_factor() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are exhausted.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut last_err: Option<StoreError> = None;

    for attempt in 1..=policy.max_attempts.max(1) {
        let delay = policy.delay(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                warn!(operation = what, attempt, error = %err, "retryable store error");
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_err.unwrap_or_else(|| StoreError::Unavailable(format!("{} never ran", what))))
}
