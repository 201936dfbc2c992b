use std::collections::HashMap;

use crate::types::{ProgressPhase, ProgressSignal, Sequence};

/// Returns the sequences of the signals with the given phase, in emission order.
pub fn sequences_with_phase(signals: &[ProgressSignal], phase: ProgressPhase) -> Vec<Sequence> {
    signals
        .iter()
        .filter(|signal| signal.phase == phase)
        .map(|signal| signal.sequence.clone())
        .collect()
}

/// Checks that every `Completed(s)` follows a still unmatched `Started(s)`.
///
/// Started signals without a completion are allowed, since they are what a failed batch leaves
/// behind.
pub fn check_signal_pairing(signals: &[ProgressSignal]) -> bool {
    let mut open: HashMap<&Sequence, usize> = HashMap::new();

    for signal in signals {
        match signal.phase {
            ProgressPhase::Started => *open.entry(&signal.sequence).or_default() += 1,
            ProgressPhase::Completed => match open.get_mut(&signal.sequence) {
                Some(count) if *count > 0 => *count -= 1,
                _ => return false,
            },
        }
    }

    true
}

/// Returns the number of `Started` signals that never got their `Completed` counterpart.
pub fn unmatched_started_count(signals: &[ProgressSignal]) -> usize {
    let started = sequences_with_phase(signals, ProgressPhase::Started).len();
    let completed = sequences_with_phase(signals, ProgressPhase::Completed).len();

    started.saturating_sub(completed)
}
