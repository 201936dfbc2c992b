use serde::{Deserialize, Serialize};

use crate::load::{Config, LoadConfigError, load_config};
use crate::shared::{ValidationError, WorkerPoolConfig};

/// Capacities of the in-process queues connecting the replication stages.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct QueueConfig {
    /// Maximum number of change events buffered before producers are suspended.
    ///
    /// If `None`, the queue is unbounded.
    #[serde(default)]
    pub changes_capacity: Option<usize>,
    /// Maximum number of progress signals buffered before workers are suspended.
    ///
    /// If `None`, the queue is unbounded.
    #[serde(default)]
    pub reports_capacity: Option<usize>,
}

impl QueueConfig {
    /// Validates the queue capacities.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.changes_capacity == Some(0) {
            return Err(ValidationError::QueueCapacityZero("queue.changes_capacity"));
        }

        if self.reports_capacity == Some(0) {
            return Err(ValidationError::QueueCapacityZero("queue.reports_capacity"));
        }

        Ok(())
    }
}

/// Complete configuration of a replicator process.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ReplicatorConfig {
    /// Configuration of the worker pool.
    pub pool: WorkerPoolConfig,
    /// Configuration of the changes and reports queues.
    #[serde(default)]
    pub queue: QueueConfig,
}

impl ReplicatorConfig {
    /// Validates the complete replicator configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pool.validate()?;
        self.queue.validate()
    }
}

impl Config for ReplicatorConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

/// Loads the [`ReplicatorConfig`] from the `configuration` directory of the current working
/// directory.
pub fn load_replicator_config() -> Result<ReplicatorConfig, LoadConfigError> {
    load_config::<ReplicatorConfig>()
}
