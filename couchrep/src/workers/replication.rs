use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info};

use crate::concurrency::queue::{Acquired, ChangesSource, ProgressSink};
use crate::error::{RepError, RepResult};
use crate::metrics::{
    COUCHREP_ACTIVE_WORKERS, COUCHREP_BATCH_SIZE, COUCHREP_BATCHES_PROCESSED_TOTAL,
    COUCHREP_MISSING_REVISIONS_TOTAL, COUCHREP_REVISIONS_CHECKED_TOTAL,
    COUCHREP_REVS_DIFF_DURATION_SECONDS, REPLICATION_ID_LABEL,
};
use crate::peer::TargetPeer;
use crate::types::{
    ChangeEvent, DocumentRevisionSet, MissingRevisionsResult, ProgressSignal, Sequence,
    WorkerIdentity, max_sequence,
};
use crate::workers::base::{Worker, WorkerHandle};

/// Asks `target` which revisions of `batch` it is missing.
///
/// The batch is flattened into a duplicate-free [`DocumentRevisionSet`] and sent to the target
/// in exactly one revision diff request.
pub async fn find_missing_revs<T: TargetPeer>(
    target: &T,
    batch: &[ChangeEvent],
) -> RepResult<MissingRevisionsResult> {
    let revisions = DocumentRevisionSet::from_batch(batch);

    diff_revisions(target, &revisions).await
}

async fn diff_revisions<T: TargetPeer>(
    target: &T,
    revisions: &DocumentRevisionSet,
) -> RepResult<MissingRevisionsResult> {
    let response = target.revs_diff(revisions).await?;

    MissingRevisionsResult::from_revs_diff(revisions, response)
}

#[derive(Debug)]
pub struct ReplicationWorkerStateInner {
    identity: WorkerIdentity,
    in_flight_sequence: Option<Sequence>,
    last_completed_sequence: Option<Sequence>,
    batches_completed: u64,
}

impl ReplicationWorkerStateInner {
    fn mark_started(&mut self, sequence: Sequence) {
        self.in_flight_sequence = Some(sequence);
    }

    fn mark_completed(&mut self, sequence: Sequence) {
        self.in_flight_sequence = None;
        self.last_completed_sequence = Some(sequence);
        self.batches_completed += 1;
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    /// Sequence of the batch the worker is processing, if any.
    ///
    /// A worker that failed keeps the sequence of the batch it failed on.
    pub fn in_flight_sequence(&self) -> Option<&Sequence> {
        self.in_flight_sequence.as_ref()
    }

    pub fn last_completed_sequence(&self) -> Option<&Sequence> {
        self.last_completed_sequence.as_ref()
    }

    pub fn batches_completed(&self) -> u64 {
        self.batches_completed
    }
}

#[derive(Debug, Clone)]
pub struct ReplicationWorkerState {
    inner: Arc<RwLock<ReplicationWorkerStateInner>>,
}

impl ReplicationWorkerState {
    fn new(identity: WorkerIdentity) -> Self {
        let inner = ReplicationWorkerStateInner {
            identity,
            in_flight_sequence: None,
            last_completed_sequence: None,
            batches_completed: 0,
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    pub fn get_inner(&self) -> &RwLock<ReplicationWorkerStateInner> {
        &self.inner
    }
}

/// Lock serializing how workers take batches from a shared changes source.
///
/// A worker holds it from the moment it asks for a batch until the `Started` signal of that batch
/// is published. Batches are therefore announced in the order they were taken, and the checkpoint
/// can't move past a batch that was taken but not announced yet.
#[derive(Debug, Clone, Default)]
pub struct BatchIntake {
    lock: Arc<Mutex<()>>,
}

impl BatchIntake {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Batch that was taken from the changes source and announced with a `Started` signal.
#[derive(Debug)]
struct StartedBatch {
    events: Vec<ChangeEvent>,
    report_sequence: Sequence,
}

#[derive(Debug)]
pub struct ReplicationWorkerHandle {
    identity: WorkerIdentity,
    state: ReplicationWorkerState,
    handle: Option<JoinHandle<RepResult<()>>>,
}

impl ReplicationWorkerHandle {
    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }
}

impl WorkerHandle<ReplicationWorkerState> for ReplicationWorkerHandle {
    fn state(&self) -> ReplicationWorkerState {
        self.state.clone()
    }

    async fn wait(mut self) -> RepResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.await??;

        Ok(())
    }
}

/// Worker that computes the revisions missing on the target for batches of change events.
///
/// Every batch is bracketed by a [`ProgressSignal`] pair carrying its highest sequence: the
/// `Started` signal is published before the target is contacted and the `Completed` signal only
/// after the missing revisions have been computed. A failure leaves the `Started` signal
/// unmatched and stops the worker.
#[derive(Debug)]
pub struct ReplicationWorker<C, T, P> {
    identity: WorkerIdentity,
    changes: C,
    target: T,
    reports: P,
    batch_size: usize,
    intake: BatchIntake,
    state: ReplicationWorkerState,
}

impl<C, T, P> ReplicationWorker<C, T, P> {
    pub fn new(
        identity: WorkerIdentity,
        changes: C,
        target: T,
        reports: P,
        batch_size: usize,
    ) -> Self {
        let state = ReplicationWorkerState::new(identity.clone());

        Self {
            identity,
            changes,
            target,
            reports,
            batch_size,
            intake: BatchIntake::new(),
            state,
        }
    }

    /// Makes the worker take its batches through `intake`, shared with the other workers of the
    /// same changes source.
    pub fn with_intake(mut self, intake: BatchIntake) -> Self {
        self.intake = intake;
        self
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    pub fn state(&self) -> ReplicationWorkerState {
        self.state.clone()
    }
}

impl<C, T, P> ReplicationWorker<C, T, P>
where
    C: ChangesSource + Sync,
    T: TargetPeer + Sync,
    P: ProgressSink + Sync,
{
    /// Processes batches until the changes source is closed.
    ///
    /// Returns the first error hit while processing a batch.
    pub async fn run(&self) -> RepResult<()> {
        while let Some(batch) = self.take_batch().await? {
            self.complete_batch(batch).await?;
        }

        info!("changes source closed, stopping replication worker");

        Ok(())
    }

    /// Takes the next non-empty batch and publishes its `Started` signal while holding the intake
    /// lock.
    ///
    /// Returns `None` once the changes source is closed.
    async fn take_batch(&self) -> RepResult<Option<StartedBatch>> {
        let _intake = self.intake.lock.lock().await;

        loop {
            let events = match self.changes.acquire(self.batch_size).await {
                Acquired::Batch(events) => events,
                Acquired::Closed => return Ok(None),
            };

            let Some(report_sequence) = max_sequence(&events).cloned() else {
                debug!("received an empty batch, skipping it");
                continue;
            };

            let batch = StartedBatch {
                events,
                report_sequence,
            };
            self.start_batch(&batch).await?;

            return Ok(Some(batch));
        }
    }

    /// Computes the missing revisions of one batch, publishing its progress signals.
    ///
    /// An empty batch is skipped without publishing anything and yields `None`.
    pub async fn process_batch(
        &self,
        batch: Vec<ChangeEvent>,
    ) -> RepResult<Option<MissingRevisionsResult>> {
        let Some(report_sequence) = max_sequence(&batch).cloned() else {
            debug!("received an empty batch, skipping it");
            return Ok(None);
        };

        let batch = StartedBatch {
            events: batch,
            report_sequence,
        };
        self.start_batch(&batch).await?;

        self.complete_batch(batch).await.map(Some)
    }

    async fn start_batch(&self, batch: &StartedBatch) -> RepResult<()> {
        let report_sequence = &batch.report_sequence;
        debug!(
            batch_size = batch.events.len(),
            %report_sequence,
            "received batch of change events"
        );
        gauge!(
            COUCHREP_BATCH_SIZE,
            REPLICATION_ID_LABEL => self.identity.replication_id.clone()
        )
        .set(batch.events.len() as f64);

        self.reports
            .publish(ProgressSignal::started(report_sequence.clone()))
            .await?;
        self.state
            .inner
            .write()
            .await
            .mark_started(report_sequence.clone());

        Ok(())
    }

    /// Runs the revision diff of a started batch and publishes its `Completed` signal.
    async fn complete_batch(&self, batch: StartedBatch) -> RepResult<MissingRevisionsResult> {
        let StartedBatch {
            events,
            report_sequence,
        } = batch;
        let replication_id = self.identity.replication_id.clone();

        let revisions = DocumentRevisionSet::from_batch(&events);
        let revisions_count = revisions.revisions_count();
        let before_diff = Instant::now();
        let missing = diff_revisions(&self.target, &revisions).await?;
        histogram!(
            COUCHREP_REVS_DIFF_DURATION_SECONDS,
            REPLICATION_ID_LABEL => replication_id.clone()
        )
        .record(before_diff.elapsed().as_secs_f64());

        debug!(
            revisions_count,
            missing_count = missing.missing_count(),
            documents_with_missing = missing.len(),
            "computed missing revisions of batch"
        );
        counter!(COUCHREP_BATCHES_PROCESSED_TOTAL, REPLICATION_ID_LABEL => replication_id.clone())
            .increment(1);
        counter!(COUCHREP_REVISIONS_CHECKED_TOTAL, REPLICATION_ID_LABEL => replication_id.clone())
            .increment(revisions_count as u64);
        counter!(COUCHREP_MISSING_REVISIONS_TOTAL, REPLICATION_ID_LABEL => replication_id)
            .increment(missing.missing_count() as u64);

        self.reports
            .publish(ProgressSignal::completed(report_sequence.clone()))
            .await?;
        self.state
            .inner
            .write()
            .await
            .mark_completed(report_sequence);

        Ok(missing)
    }
}

impl<C, T, P> Worker<ReplicationWorkerHandle, ReplicationWorkerState>
    for ReplicationWorker<C, T, P>
where
    C: ChangesSource + Send + Sync + 'static,
    T: TargetPeer + Send + Sync + 'static,
    P: ProgressSink + Send + Sync + 'static,
{
    type Error = RepError;

    async fn start(self) -> RepResult<ReplicationWorkerHandle> {
        let identity = self.identity.clone();
        let state = self.state.clone();

        let replication_worker_span = tracing::info_span!(
            "replication_worker",
            replication_id = %identity.replication_id,
            worker_id = %identity.worker_id
        );
        let replication_worker = async move {
            info!("starting replication worker");

            let active_workers = gauge!(
                COUCHREP_ACTIVE_WORKERS,
                REPLICATION_ID_LABEL => self.identity.replication_id.clone()
            );
            active_workers.increment(1.0);
            let result = self.run().await;
            active_workers.decrement(1.0);

            match &result {
                Ok(()) => info!("replication worker completed successfully"),
                Err(err) => error!(error = %err, "replication worker failed"),
            }

            result
        }
        .instrument(replication_worker_span);

        let handle = tokio::spawn(replication_worker);

        Ok(ReplicationWorkerHandle {
            identity,
            state,
            handle: Some(handle),
        })
    }
}
