//! Retry policy with exponential backoff and jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry tuning for transient dispatch failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum delivery attempts per action before it fails terminally.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub base_delay: Duration,

    /// Upper bound on any single delay.
    pub max_delay: Duration,

    /// Multiplier applied per attempt.
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(60_000),
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff before re-delivering after `attempt` failed (1-based):
    /// `min(max_delay, base · e^(attempt−1))` with up to ±20% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let raw = self.base_delay.as_millis() as f64 * self.exponential_base.powi(exponent as i32);
        let capped = raw.min(self.max_delay.as_millis() as f64);
        let jitter = rand::thread_rng().gen_range(0.8..=1.2);
        Duration::from_millis((capped * jitter) as u64)
    }

    /// Whether a failure on `attempt` (1-based) may be retried.
    pub fn retryable(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
