use serde::{Deserialize, Serialize};

use crate::shared::{BatchConfig, RetryConfig, ValidationError};

/// Configuration for a pool of replication workers.
///
/// Every worker of the pool shares the same replication id, batching parameters and retry
/// policy.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerPoolConfig {
    /// Identifier of the replication session every worker of the pool belongs to.
    pub replication_id: String,
    /// Number of workers the pool starts.
    pub worker_processes: u16,
    /// Batch acquisition parameters.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Retry policy for revision-diff requests.
    ///
    /// If `None`, a failed request fails the worker that issued it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

impl WorkerPoolConfig {
    /// Validates the pool configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.worker_processes == 0 {
            return Err(ValidationError::WorkerProcessesZero);
        }

        if self.batch.max_size == 0 {
            return Err(ValidationError::BatchMaxSizeZero);
        }

        if let Some(retry) = &self.retry {
            if retry.max_attempts == 0 {
                return Err(ValidationError::RetryMaxAttemptsZero);
            }

            if retry.backoff_factor < 1.0 {
                return Err(ValidationError::RetryBackoffFactorTooSmall(
                    retry.backoff_factor,
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_config() -> WorkerPoolConfig {
        WorkerPoolConfig {
            replication_id: "rep".to_string(),
            worker_processes: 4,
            batch: BatchConfig::default(),
            retry: None,
        }
    }

    #[test]
    fn test_valid_config() {
        assert_eq!(pool_config().validate(), Ok(()));
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let mut config = pool_config();
        config.worker_processes = 0;

        assert_eq!(config.validate(), Err(ValidationError::WorkerProcessesZero));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let mut config = pool_config();
        config.batch.max_size = 0;

        assert_eq!(config.validate(), Err(ValidationError::BatchMaxSizeZero));
    }

    #[test]
    fn test_invalid_retry_policy_is_rejected() {
        let mut config = pool_config();
        config.retry = Some(RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        });
        assert_eq!(config.validate(), Err(ValidationError::RetryMaxAttemptsZero));

        config.retry = Some(RetryConfig {
            backoff_factor: 0.5,
            ..RetryConfig::default()
        });
        assert_eq!(
            config.validate(),
            Err(ValidationError::RetryBackoffFactorTooSmall(0.5))
        );
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: WorkerPoolConfig = serde_json::from_str(
            r#"{ "replication_id": "abc", "worker_processes": 2 }"#,
        )
        .unwrap();

        assert_eq!(config.batch, BatchConfig::default());
        assert_eq!(config.retry, None);
    }
}
