use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Batch acquisition configuration for replication workers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Maximum number of change events a worker takes from the changes queue at once.
    pub max_size: usize,
    /// Maximum time, in milliseconds, to wait for a batch to fill before a partial batch is
    /// handed to the worker.
    pub max_fill_ms: u64,
}

impl BatchConfig {
    /// Returns the partial-batch flush deadline as a [`Duration`].
    pub fn max_fill(&self) -> Duration {
        Duration::from_millis(self.max_fill_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            max_fill_ms: 1000,
        }
    }
}
