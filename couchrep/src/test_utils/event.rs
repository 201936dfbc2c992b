use crate::types::{ChangeEvent, Sequence};

/// Builds a change event with a numeric sequence.
pub fn change_event(doc_id: &str, seq: u64, revs: &[&str]) -> ChangeEvent {
    ChangeEvent::new(doc_id, seq, revs.iter().copied())
}

/// Builds a change event with an opaque textual sequence.
pub fn text_change_event(doc_id: &str, seq: &str, revs: &[&str]) -> ChangeEvent {
    ChangeEvent::new(doc_id, Sequence::from(seq), revs.iter().copied())
}

/// Builds `count` change events for distinct documents with sequences `1..=count`.
///
/// Every document carries the single revision `1-<doc_id>`.
pub fn sequential_change_events(count: u64) -> Vec<ChangeEvent> {
    (1..=count)
        .map(|seq| {
            let doc_id = format!("doc-{seq}");
            let rev = format!("1-{doc_id}");
            ChangeEvent::new(doc_id, seq, [rev])
        })
        .collect()
}
