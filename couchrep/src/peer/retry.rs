use couchrep_config::shared::RetryConfig;
use tracing::warn;

use crate::error::RepResult;
use crate::peer::base::TargetPeer;
use crate::types::{DocumentRevisionSet, RevsDiffResponse};

/// [`TargetPeer`] that re-issues failed revision-diff requests according to a [`RetryConfig`].
///
/// Only retryable errors are re-attempted. Without a retry policy every request is attempted
/// exactly once.
#[derive(Debug, Clone)]
pub struct RetryingTargetPeer<T> {
    inner: T,
    retry: Option<RetryConfig>,
}

impl<T> RetryingTargetPeer<T> {
    pub fn new(inner: T, retry: Option<RetryConfig>) -> Self {
        Self { inner, retry }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn max_attempts(&self) -> u32 {
        self.retry
            .as_ref()
            .map(|retry| retry.max_attempts.max(1))
            .unwrap_or(1)
    }
}

impl<T> TargetPeer for RetryingTargetPeer<T>
where
    T: TargetPeer + Sync,
{
    async fn revs_diff(&self, revisions: &DocumentRevisionSet) -> RepResult<RevsDiffResponse> {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            let err = match self.inner.revs_diff(revisions).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            let Some(retry) = self.retry.as_ref() else {
                return Err(err);
            };

            if !err.is_retryable() || attempt >= max_attempts {
                return Err(err);
            }

            let delay = retry.delay_after(attempt);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "revision diff request failed, retrying"
            );
            tokio::time::sleep(delay).await;

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::peer::memory::MemoryTargetPeer;
    use crate::test_utils::event::change_event;
    use crate::test_utils::target::TestTargetWrapper;

    fn retry_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay_ms: 10,
            max_delay_ms: 100,
            backoff_factor: 2.0,
        }
    }

    fn revisions() -> DocumentRevisionSet {
        DocumentRevisionSet::from_batch(&[change_event("a", 1, &["1-x"])])
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failures_are_retried() {
        let target = TestTargetWrapper::wrap(MemoryTargetPeer::new());
        target
            .fail_next_requests(2, ErrorKind::TargetConnectionFailed)
            .await;

        let peer = RetryingTargetPeer::new(target.clone(), Some(retry_config(3)));
        let response = peer.revs_diff(&revisions()).await.unwrap();

        assert_eq!(response.len(), 1);
        assert_eq!(target.requests().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let target = TestTargetWrapper::wrap(MemoryTargetPeer::new());
        target
            .fail_next_requests(5, ErrorKind::TargetRequestFailed)
            .await;

        let peer = RetryingTargetPeer::new(target.clone(), Some(retry_config(3)));
        let err = peer.revs_diff(&revisions()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TargetRequestFailed);
        assert_eq!(target.requests().await.len(), 3);
    }

    #[tokio::test]
    async fn test_protocol_violations_are_not_retried() {
        let target = TestTargetWrapper::wrap(MemoryTargetPeer::new());
        target
            .fail_next_requests(1, ErrorKind::TargetProtocolViolation)
            .await;

        let peer = RetryingTargetPeer::new(target.clone(), Some(retry_config(3)));
        let err = peer.revs_diff(&revisions()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TargetProtocolViolation);
        assert_eq!(target.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_without_policy_attempts_once() {
        let target = TestTargetWrapper::wrap(MemoryTargetPeer::new());
        target
            .fail_next_requests(1, ErrorKind::TargetConnectionFailed)
            .await;

        let peer = RetryingTargetPeer::new(target.clone(), None);
        let err = peer.revs_diff(&revisions()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TargetConnectionFailed);
        assert_eq!(target.requests().await.len(), 1);
    }
}
