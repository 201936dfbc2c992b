//! Safe checkpoint computation from the progress signals of replication workers.
//!
//! Workers report batches out of order, so the highest completed sequence is not necessarily
//! safe to persist. A sequence is safe once every batch that started with a lower or equal
//! sequence has completed.

use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::bail;
use crate::concurrency::queue::{Acquired, WorkQueue};
use crate::error::{ErrorKind, RepResult};
use crate::types::{ProgressPhase, ProgressSignal, Sequence};

/// Maximum number of signals read from the report queue at once.
const MAX_SIGNALS_PER_READ: usize = 128;

/// Computes the highest sequence that is safe to checkpoint.
#[derive(Debug, Default, Clone)]
pub struct ProgressTracker {
    /// Started sequences with the number of batches still in flight for each of them.
    in_flight: BTreeMap<Sequence, usize>,
    /// Completed sequences not yet covered by the safe sequence.
    completed: BTreeSet<Sequence>,
    safe_sequence: Option<Sequence>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker resuming from a previously persisted checkpoint.
    pub fn with_checkpoint(checkpoint: Sequence) -> Self {
        Self {
            safe_sequence: Some(checkpoint),
            ..Self::default()
        }
    }

    pub fn safe_sequence(&self) -> Option<&Sequence> {
        self.safe_sequence.as_ref()
    }

    /// Returns the number of batches that started and didn't complete yet.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.values().sum()
    }

    /// Applies a signal and returns the new safe sequence if it moved forward.
    ///
    /// Fails with [`ErrorKind::InvalidData`] on a `Completed` signal without a matching
    /// `Started` signal.
    pub fn record(&mut self, signal: &ProgressSignal) -> RepResult<Option<&Sequence>> {
        match signal.phase {
            ProgressPhase::Started => {
                *self.in_flight.entry(signal.sequence.clone()).or_default() += 1;
                return Ok(None);
            }
            ProgressPhase::Completed => {
                let Some(count) = self.in_flight.get_mut(&signal.sequence) else {
                    bail!(
                        ErrorKind::InvalidData,
                        "Received a completion without a matching start",
                        format!("No batch with sequence {} is in flight", signal.sequence)
                    );
                };

                *count -= 1;
                if *count == 0 {
                    self.in_flight.remove(&signal.sequence);
                }

                self.completed.insert(signal.sequence.clone());
            }
        }

        Ok(self.advance())
    }

    fn advance(&mut self) -> Option<&Sequence> {
        let candidate = match self.in_flight.first_key_value() {
            Some((lowest_in_flight, _)) => self.completed.range(..lowest_in_flight).next_back(),
            None => self.completed.last(),
        }
        .cloned()?;

        // Completed sequences up to the candidate are covered from now on.
        self.completed = self.completed.split_off(&candidate);
        self.completed.remove(&candidate);

        if self
            .safe_sequence
            .as_ref()
            .is_some_and(|safe_sequence| *safe_sequence >= candidate)
        {
            return None;
        }

        self.safe_sequence = Some(candidate);
        self.safe_sequence.as_ref()
    }
}

/// Feeds `tracker` with the signals of `reports` until the queue is closed and drained.
///
/// Every time the safe sequence moves forward, it's published on `safe_sequence_tx`. Returns the
/// tracker in its final state.
pub async fn track_progress(
    reports: WorkQueue<ProgressSignal>,
    mut tracker: ProgressTracker,
    safe_sequence_tx: watch::Sender<Option<Sequence>>,
) -> RepResult<ProgressTracker> {
    loop {
        let signals = match reports.get(MAX_SIGNALS_PER_READ).await {
            Acquired::Batch(signals) => signals,
            Acquired::Closed => break,
        };

        for signal in &signals {
            if let Some(safe_sequence) = tracker.record(signal)? {
                debug!(%safe_sequence, "safe checkpoint sequence advanced");
                safe_sequence_tx.send_replace(Some(safe_sequence.clone()));
            }
        }
    }

    info!(
        safe_sequence = ?tracker.safe_sequence(),
        in_flight = tracker.in_flight_count(),
        "progress report queue closed, stopping progress tracking"
    );

    Ok(tracker)
}
