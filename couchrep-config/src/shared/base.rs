use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// The worker pool must run at least one worker.
    #[error("`worker_processes` cannot be zero")]
    WorkerProcessesZero,
    /// Batches must be able to hold at least one change event.
    #[error("`batch.max_size` cannot be zero")]
    BatchMaxSizeZero,
    /// Retries must be attempted at least once when a retry policy is configured.
    #[error("`retry.max_attempts` cannot be zero")]
    RetryMaxAttemptsZero,
    /// The backoff factor must not shrink the delay between retries.
    #[error("`retry.backoff_factor` must be at least 1.0, got {0}")]
    RetryBackoffFactorTooSmall(f32),
    /// A bounded queue must be able to hold at least one item.
    #[error("`{0}` cannot be zero when set")]
    QueueCapacityZero(&'static str),
}
