use couchrep_config::shared::{BatchConfig, QueueConfig};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::time::Instant;

use crate::bail;
use crate::error::{ErrorKind, RepError, RepResult};
use crate::types::{ChangeEvent, ProgressSignal};

/// Result of acquiring items from a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquired<B> {
    /// A non-empty batch of items.
    Batch(B),
    /// The queue was closed and every item has been consumed.
    Closed,
}

/// Source of change-event batches consumed by replication workers.
pub trait ChangesSource {
    /// Acquires up to `max_count` change events.
    ///
    /// Suspends until a batch is available or the source is closed. Once
    /// [`Acquired::Closed`] has been returned, every later call returns it as well.
    fn acquire(
        &self,
        max_count: usize,
    ) -> impl Future<Output = Acquired<Vec<ChangeEvent>>> + Send;
}

/// Sink receiving the progress signals of replication workers.
///
/// Signals published by one caller must be delivered in the order they were published.
pub trait ProgressSink {
    fn publish(&self, signal: ProgressSignal) -> impl Future<Output = RepResult<()>> + Send;
}

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

#[derive(Debug)]
struct Shared<T> {
    inner: Mutex<Inner<T>>,
    capacity: Option<usize>,
    max_fill: Duration,
    items_added: Notify,
    space_freed: Notify,
}

/// In-process multi-producer, multi-consumer queue that can be closed.
///
/// Producers [`WorkQueue::put`] items and suspend while a bounded queue is full. Consumers
/// [`WorkQueue::get`] batches: a batch is handed out as soon as the requested amount of items
/// is buffered, when `max_fill` has elapsed since the consumer first saw a buffered item, or
/// when the queue gets closed. Closing is permanent and wakes up every waiting producer and
/// consumer; items buffered at that point can still be drained.
pub struct WorkQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> WorkQueue<T> {
    /// Creates an unbounded queue.
    pub fn unbounded(max_fill: Duration) -> Self {
        Self::with_capacity(None, max_fill)
    }

    /// Creates a queue holding at most `capacity` items.
    pub fn bounded(capacity: usize, max_fill: Duration) -> Self {
        Self::with_capacity(Some(capacity.max(1)), max_fill)
    }

    /// Creates a queue with an optional capacity.
    pub fn with_capacity(capacity: Option<usize>, max_fill: Duration) -> Self {
        let inner = Inner {
            items: VecDeque::new(),
            closed: false,
        };

        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                capacity,
                max_fill,
                items_added: Notify::new(),
                space_freed: Notify::new(),
            }),
        }
    }

    /// Adds an item to the queue, waiting for free space if the queue is full.
    ///
    /// Fails with [`ErrorKind::QueueClosed`] if the queue is closed, even while waiting.
    pub async fn put(&self, item: T) -> RepResult<()> {
        loop {
            let space_freed = self.shared.space_freed.notified();
            tokio::pin!(space_freed);
            // Registers interest before inspecting the queue so that no wakeup is lost.
            space_freed.as_mut().enable();

            {
                let mut inner = self.shared.inner.lock().await;
                if inner.closed {
                    bail!(
                        ErrorKind::QueueClosed,
                        "Cannot put an item into a closed queue"
                    );
                }

                let has_space = self
                    .shared
                    .capacity
                    .is_none_or(|capacity| inner.items.len() < capacity);
                if has_space {
                    inner.items.push_back(item);
                    drop(inner);

                    self.shared.items_added.notify_waiters();

                    return Ok(());
                }
            }

            space_freed.await;
        }
    }

    /// Takes up to `max_count` items from the queue.
    ///
    /// Returns [`Acquired::Closed`] only once the queue is closed and empty, never an empty
    /// batch.
    pub async fn get(&self, max_count: usize) -> Acquired<Vec<T>> {
        let max_count = max_count.max(1);
        let mut flush_deadline: Option<Instant> = None;

        loop {
            let items_added = self.shared.items_added.notified();
            tokio::pin!(items_added);
            items_added.as_mut().enable();

            {
                let mut inner = self.shared.inner.lock().await;
                let available = inner.items.len();

                if available == 0 {
                    if inner.closed {
                        return Acquired::Closed;
                    }

                    // Other consumers took the items we were waiting on.
                    flush_deadline = None;
                } else {
                    let deadline_passed =
                        flush_deadline.is_some_and(|deadline| Instant::now() >= deadline);

                    if available >= max_count || inner.closed || deadline_passed {
                        let batch = inner
                            .items
                            .drain(..available.min(max_count))
                            .collect::<Vec<_>>();
                        drop(inner);

                        self.shared.space_freed.notify_waiters();

                        return Acquired::Batch(batch);
                    }

                    if flush_deadline.is_none() {
                        flush_deadline = Some(Instant::now() + self.shared.max_fill);
                    }
                }
            }

            match flush_deadline {
                Some(deadline) => {
                    let _ = tokio::time::timeout_at(deadline, items_added).await;
                }
                None => items_added.await,
            }
        }
    }

    /// Closes the queue.
    ///
    /// Closing an already closed queue has no effect.
    pub async fn close(&self) {
        {
            let mut inner = self.shared.inner.lock().await;
            inner.closed = true;
        }

        self.shared.items_added.notify_waiters();
        self.shared.space_freed.notify_waiters();
    }

    pub async fn is_closed(&self) -> bool {
        self.shared.inner.lock().await.closed
    }

    /// Returns the number of buffered items.
    pub async fn len(&self) -> usize {
        self.shared.inner.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Closes the queue and returns every item still buffered.
    pub async fn close_and_drain(&self) -> Vec<T> {
        let items = {
            let mut inner = self.shared.inner.lock().await;
            inner.closed = true;
            inner.items.drain(..).collect()
        };

        self.shared.items_added.notify_waiters();
        self.shared.space_freed.notify_waiters();

        items
    }
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("capacity", &self.shared.capacity)
            .field("max_fill", &self.shared.max_fill)
            .finish()
    }
}

/// Creates the changes queue and the progress report queue described by `queue`.
///
/// Both queues flush partial batches after the `max_fill` deadline of `batch`.
pub fn create_queues(
    queue: &QueueConfig,
    batch: &BatchConfig,
) -> (WorkQueue<ChangeEvent>, WorkQueue<ProgressSignal>) {
    let changes = WorkQueue::with_capacity(queue.changes_capacity, batch.max_fill());
    let reports = WorkQueue::with_capacity(queue.reports_capacity, batch.max_fill());

    (changes, reports)
}

impl ChangesSource for WorkQueue<ChangeEvent> {
    async fn acquire(&self, max_count: usize) -> Acquired<Vec<ChangeEvent>> {
        self.get(max_count).await
    }
}

impl ProgressSink for WorkQueue<ProgressSignal> {
    async fn publish(&self, signal: ProgressSignal) -> RepResult<()> {
        self.put(signal).await.map_err(|err| {
            RepError::from((
                ErrorKind::ProgressSinkClosed,
                "The progress report queue is closed",
                err.to_string(),
            ))
        })
    }
}

impl ProgressSink for mpsc::Sender<ProgressSignal> {
    async fn publish(&self, signal: ProgressSignal) -> RepResult<()> {
        if self.send(signal).await.is_err() {
            bail!(
                ErrorKind::ProgressSinkClosed,
                "The progress report receiver was dropped"
            );
        }

        Ok(())
    }
}

impl ProgressSink for mpsc::UnboundedSender<ProgressSignal> {
    async fn publish(&self, signal: ProgressSignal) -> RepResult<()> {
        if self.send(signal).is_err() {
            bail!(
                ErrorKind::ProgressSinkClosed,
                "The progress report receiver was dropped"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sequence;

    const LONG_FILL: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_get_returns_full_batch_in_fifo_order() {
        let queue = WorkQueue::unbounded(LONG_FILL);
        for i in 0..5 {
            queue.put(i).await.unwrap();
        }

        assert_eq!(queue.get(3).await, Acquired::Batch(vec![0, 1, 2]));
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn test_close_flushes_partial_batch_then_reports_closed() {
        let queue = WorkQueue::unbounded(LONG_FILL);
        queue.put("a").await.unwrap();
        queue.put("b").await.unwrap();
        queue.close().await;

        assert_eq!(queue.get(10).await, Acquired::Batch(vec!["a", "b"]));
        assert_eq!(queue.get(10).await, Acquired::<Vec<&str>>::Closed);
        assert_eq!(queue.get(10).await, Acquired::<Vec<&str>>::Closed);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let queue = WorkQueue::<u32>::unbounded(LONG_FILL);
        queue.close().await;
        queue.close().await;

        assert!(queue.is_closed().await);
        assert_eq!(queue.get(1).await, Acquired::Closed);
    }

    #[tokio::test]
    async fn test_put_into_closed_queue_fails() {
        let queue = WorkQueue::unbounded(LONG_FILL);
        queue.close().await;

        let err = queue.put(1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QueueClosed);
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_consumer() {
        let queue = WorkQueue::<u32>::unbounded(LONG_FILL);
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get(10).await })
        };

        tokio::task::yield_now().await;
        queue.close().await;

        assert_eq!(consumer.await.unwrap(), Acquired::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_batch_is_flushed_after_max_fill() {
        let queue = WorkQueue::unbounded(Duration::from_millis(100));
        queue.put(1).await.unwrap();

        let started = Instant::now();
        assert_eq!(queue.get(10).await, Acquired::Batch(vec![1]));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_bounded_put_waits_for_space() {
        let queue = WorkQueue::bounded(1, LONG_FILL);
        queue.put(1).await.unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.put(2).await })
        };

        tokio::task::yield_now().await;
        assert_eq!(queue.len().await, 1);

        assert_eq!(queue.get(1).await, Acquired::Batch(vec![1]));
        producer.await.unwrap().unwrap();
        assert_eq!(queue.get(1).await, Acquired::Batch(vec![2]));
    }

    #[tokio::test]
    async fn test_close_fails_blocked_producer() {
        let queue = WorkQueue::bounded(1, LONG_FILL);
        queue.put(1).await.unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.put(2).await })
        };

        tokio::task::yield_now().await;
        let drained = queue.close_and_drain().await;

        assert_eq!(drained, vec![1]);
        let err = producer.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QueueClosed);
    }

    #[tokio::test]
    async fn test_progress_queue_sink() {
        let queue = WorkQueue::unbounded(Duration::ZERO);
        queue
            .publish(ProgressSignal::started(Sequence::Number(3)))
            .await
            .unwrap();
        queue
            .publish(ProgressSignal::completed(Sequence::Number(3)))
            .await
            .unwrap();

        assert_eq!(
            queue.get(10).await,
            Acquired::Batch(vec![
                ProgressSignal::started(Sequence::Number(3)),
                ProgressSignal::completed(Sequence::Number(3)),
            ])
        );

        queue.close().await;
        let err = queue
            .publish(ProgressSignal::started(Sequence::Number(4)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProgressSinkClosed);
    }

    #[tokio::test]
    async fn test_channel_sink_fails_once_receiver_is_dropped() {
        let (tx, rx) = mpsc::channel(4);
        tx.publish(ProgressSignal::started(Sequence::Number(1)))
            .await
            .unwrap();
        drop(rx);

        let err = tx
            .publish(ProgressSignal::completed(Sequence::Number(1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProgressSinkClosed);
    }

    #[tokio::test]
    async fn test_create_queues_applies_capacities() {
        let queue_config = QueueConfig {
            changes_capacity: Some(2),
            reports_capacity: None,
        };
        let (changes, reports) = create_queues(&queue_config, &BatchConfig::default());

        changes
            .put(ChangeEvent::new("a", 1u64, ["1-x"]))
            .await
            .unwrap();
        changes
            .put(ChangeEvent::new("b", 2u64, ["1-y"]))
            .await
            .unwrap();
        let blocked = tokio::time::timeout(
            Duration::from_millis(20),
            changes.put(ChangeEvent::new("c", 3u64, ["1-z"])),
        )
        .await;
        assert!(blocked.is_err());

        for seq in 0..10u64 {
            reports
                .publish(ProgressSignal::started(Sequence::Number(seq)))
                .await
                .unwrap();
        }
        assert_eq!(reports.len().await, 10);
    }
}
