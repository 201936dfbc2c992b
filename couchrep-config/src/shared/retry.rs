use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for revision-diff requests against the target peer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one, before giving up.
    pub max_attempts: u32,

    /// Initial delay, in milliseconds, before the first retry.
    pub initial_delay_ms: u64,

    /// Maximum delay, in milliseconds, between retries.
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier applied to the delay after each attempt.
    pub backoff_factor: f32,
}

impl RetryConfig {
    /// Returns the delay to wait after the failed attempt number `attempt` (starting from 1).
    ///
    /// The delay grows by `backoff_factor` after every attempt and is capped at `max_delay_ms`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms = self.initial_delay_ms as f64 * (self.backoff_factor as f64).powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay_ms as f64);

        Duration::from_millis(capped_ms as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
        }
    }
}
