use std::fmt;

use crate::types::Sequence;

/// Phase of a batch reported by a [`ProgressSignal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressPhase {
    /// The batch is in flight; its sequence must not be considered safe yet.
    Started,
    /// The batch completed.
    Completed,
}

/// Progress report emitted by a worker for one batch.
///
/// A worker emits [`ProgressPhase::Started`] for a batch before doing any network work for it
/// and [`ProgressPhase::Completed`] once the batch has been processed, both carrying the
/// highest sequence of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgressSignal {
    pub phase: ProgressPhase,
    pub sequence: Sequence,
}

impl ProgressSignal {
    pub fn started(sequence: Sequence) -> Self {
        Self {
            phase: ProgressPhase::Started,
            sequence,
        }
    }

    pub fn completed(sequence: Sequence) -> Self {
        Self {
            phase: ProgressPhase::Completed,
            sequence,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.phase == ProgressPhase::Completed
    }
}

impl fmt::Display for ProgressSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.phase, self.sequence)
    }
}
