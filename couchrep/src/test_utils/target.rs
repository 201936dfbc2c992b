use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock, Semaphore};

use crate::error::{ErrorKind, RepResult};
use crate::peer::TargetPeer;
use crate::rep_error;
use crate::types::{DocumentRevisionSet, RevsDiffResponse};

type RequestCondition = Box<dyn Fn(&[DocumentRevisionSet]) -> bool + Send + Sync>;

struct Inner<T> {
    wrapped_target: T,
    requests: Vec<DocumentRevisionSet>,
    injected_failures: VecDeque<ErrorKind>,
    gate: Option<Arc<Semaphore>>,
    request_conditions: Vec<(RequestCondition, Arc<Notify>)>,
}

impl<T> Inner<T> {
    fn check_conditions(&mut self) {
        let requests = &self.requests;
        self.request_conditions.retain(|(condition, notify)| {
            let should_retain = !condition(requests);
            if !should_retain {
                notify.notify_one();
            }
            should_retain
        });
    }
}

/// A test wrapper that can wrap any target peer, record its requests and inject failures.
#[derive(Clone)]
pub struct TestTargetWrapper<T> {
    inner: Arc<RwLock<Inner<T>>>,
}

impl<T> fmt::Debug for TestTargetWrapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestTargetWrapper").finish_non_exhaustive()
    }
}

impl<T> TestTargetWrapper<T> {
    /// Create a new test wrapper around any target peer
    pub fn wrap(target: T) -> Self {
        let inner = Inner {
            wrapped_target: target,
            requests: Vec::new(),
            injected_failures: VecDeque::new(),
            gate: None,
            request_conditions: Vec::new(),
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Get all revision sets that have been sent to the target, failed requests included
    pub async fn requests(&self) -> Vec<DocumentRevisionSet> {
        self.inner.read().await.requests.clone()
    }

    /// Make the next `count` requests fail with an error of the given kind
    pub async fn fail_next_requests(&self, count: usize, kind: ErrorKind) {
        let mut inner = self.inner.write().await;
        inner
            .injected_failures
            .extend(std::iter::repeat_n(kind, count));
    }

    /// Hold every following request until it is released with [`Self::release_requests`]
    ///
    /// Requests are recorded before being held.
    pub async fn hold_requests(&self) {
        let mut inner = self.inner.write().await;
        inner.gate = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `count` held requests proceed
    pub async fn release_requests(&self, count: usize) {
        let inner = self.inner.read().await;
        if let Some(gate) = &inner.gate {
            gate.add_permits(count);
        }
    }

    /// Wait for a specific condition on the recorded requests
    pub async fn notify_on_requests<F>(&self, condition: F) -> Arc<Notify>
    where
        F: Fn(&[DocumentRevisionSet]) -> bool + Send + Sync + 'static,
    {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.write().await;
        inner
            .request_conditions
            .push((Box::new(condition), notify.clone()));
        inner.check_conditions();

        notify
    }

    /// Wait for at least `count` requests to be recorded
    pub async fn wait_for_requests_count(&self, count: usize) -> Arc<Notify> {
        self.notify_on_requests(move |requests| requests.len() >= count)
            .await
    }
}

impl<T: TargetPeer + Clone + Send + Sync> TargetPeer for TestTargetWrapper<T> {
    async fn revs_diff(&self, revisions: &DocumentRevisionSet) -> RepResult<RevsDiffResponse> {
        let (target, gate, injected_failure) = {
            let mut inner = self.inner.write().await;
            inner.requests.push(revisions.clone());
            inner.check_conditions();

            (
                inner.wrapped_target.clone(),
                inner.gate.clone(),
                inner.injected_failures.pop_front(),
            )
        };

        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if let Some(kind) = injected_failure {
            return Err(rep_error!(kind, "Injected target failure"));
        }

        target.revs_diff(revisions).await
    }
}
