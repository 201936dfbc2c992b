use couchrep_config::shared::WorkerPoolConfig;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info};

use crate::concurrency::queue::{ChangesSource, ProgressSink};
use crate::error::{ErrorKind, RepResult};
use crate::metrics::register_metrics;
use crate::peer::TargetPeer;
use crate::peer::retry::RetryingTargetPeer;
use crate::rep_error;
use crate::types::{ReplicationId, WorkerIdentity};
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::replication::{
    BatchIntake, ReplicationWorker, ReplicationWorkerHandle, ReplicationWorkerState,
};

/// Pool of replication workers sharing one changes source, target and progress sink.
///
/// Workers pull batches from the shared changes source until it is closed. Taking a batch and
/// publishing its `Started` signal happens under a lock shared by all workers of the pool, so
/// batches are announced in the order they left the source. The pool is done once every started
/// worker exited.
#[derive(Debug)]
pub struct ReplicationWorkerPool<C, T, P> {
    config: Arc<WorkerPoolConfig>,
    changes: C,
    target: RetryingTargetPeer<T>,
    reports: P,
    intake: BatchIntake,
    workers: Vec<ReplicationWorkerHandle>,
}

impl<C, T, P> ReplicationWorkerPool<C, T, P> {
    /// Creates an empty pool.
    ///
    /// When the configuration carries a retry policy, revision diffs of every worker are retried
    /// according to it.
    pub fn new(config: WorkerPoolConfig, changes: C, target: T, reports: P) -> Self {
        register_metrics();

        let target = RetryingTargetPeer::new(target, config.retry.clone());

        Self {
            config: Arc::new(config),
            changes,
            target,
            reports,
            intake: BatchIntake::new(),
            workers: Vec::new(),
        }
    }

    pub fn replication_id(&self) -> &ReplicationId {
        &self.config.replication_id
    }

    /// Returns the number of workers started so far.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Returns the identity of every started worker.
    pub fn identities(&self) -> Vec<WorkerIdentity> {
        self.workers
            .iter()
            .map(|worker| worker.identity().clone())
            .collect()
    }

    /// Returns the state of every started worker.
    pub fn worker_states(&self) -> Vec<ReplicationWorkerState> {
        self.workers.iter().map(|worker| worker.state()).collect()
    }
}

impl<C, T, P> ReplicationWorkerPool<C, T, P>
where
    C: ChangesSource + Clone + Send + Sync + 'static,
    T: TargetPeer + Clone + Send + Sync + 'static,
    P: ProgressSink + Clone + Send + Sync + 'static,
{
    /// Starts `count` workers, each with a freshly generated worker id.
    pub async fn start(&mut self, count: usize) -> RepResult<()> {
        self.config.validate().map_err(|err| {
            rep_error!(
                ErrorKind::ConfigError,
                "Invalid worker pool configuration",
                err
            )
        })?;

        info!(
            replication_id = %self.config.replication_id,
            count,
            "starting replication workers"
        );

        for _ in 0..count {
            let identity = WorkerIdentity::generate(self.config.replication_id.clone());
            let worker = ReplicationWorker::new(
                identity,
                self.changes.clone(),
                self.target.clone(),
                self.reports.clone(),
                self.config.batch.max_size,
            )
            .with_intake(self.intake.clone());

            let handle = worker.start().await?;
            debug!(
                worker_id = %handle.identity().worker_id,
                "added replication worker to the pool"
            );
            self.workers.push(handle);
        }

        Ok(())
    }

    /// Starts as many workers as configured by `worker_processes`.
    pub async fn start_configured(&mut self) -> RepResult<()> {
        let count = self.config.worker_processes as usize;
        self.start(count).await
    }

    /// Waits for every started worker to exit.
    ///
    /// A failing worker doesn't stop the others. The failures of all workers are returned
    /// together once every worker exited.
    pub async fn wait(self) -> RepResult<()> {
        info!(
            replication_id = %self.config.replication_id,
            workers = self.workers.len(),
            "waiting for replication workers to complete"
        );

        // `wait` returns either the error of the worker or the error of a caught panic.
        let results = join_all(self.workers.into_iter().map(|worker| worker.wait())).await;
        let errors: Vec<_> = results.into_iter().filter_map(Result::err).collect();

        if !errors.is_empty() {
            return Err(errors.into());
        }

        info!("all replication workers completed");

        Ok(())
    }
}
