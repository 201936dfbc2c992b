use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a change in the upstream changes feed.
///
/// Feeds either use plain integers or opaque strings as sequence tokens. Tokens of one feed are
/// always of the same variant; across variants every [`Sequence::Number`] orders before every
/// [`Sequence::Text`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sequence {
    Number(u64),
    Text(String),
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sequence::Number(number) => write!(f, "{number}"),
            Sequence::Text(text) => write!(f, "{text}"),
        }
    }
}

impl From<u64> for Sequence {
    fn from(value: u64) -> Self {
        Sequence::Number(value)
    }
}

impl From<&str> for Sequence {
    fn from(value: &str) -> Self {
        Sequence::Text(value.to_string())
    }
}

impl From<String> for Sequence {
    fn from(value: String) -> Self {
        Sequence::Text(value)
    }
}

/// A leaf revision reported for a document by the changes feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Change {
    pub rev: String,
}

/// One document's change notification, as emitted by the changes feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "id")]
    pub doc_id: String,
    #[serde(rename = "seq")]
    pub sequence: Sequence,
    pub changes: Vec<Change>,
}

impl ChangeEvent {
    pub fn new<D, S, R>(doc_id: D, sequence: S, revs: R) -> Self
    where
        D: Into<String>,
        S: Into<Sequence>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            doc_id: doc_id.into(),
            sequence: sequence.into(),
            changes: revs
                .into_iter()
                .map(|rev| Change { rev: rev.into() })
                .collect(),
        }
    }
}

/// Returns the highest sequence of a batch, independently of the order of its events.
///
/// Returns `None` for an empty batch.
pub fn max_sequence(batch: &[ChangeEvent]) -> Option<&Sequence> {
    batch.iter().map(|event| &event.sequence).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::event::change_event;

    #[test]
    fn test_max_sequence_ignores_arrival_order() {
        let batch = vec![
            change_event("a", 5, &["1-x"]),
            change_event("a", 7, &["1-x", "2-y"]),
            change_event("b", 6, &["1-z"]),
        ];

        assert_eq!(max_sequence(&batch), Some(&Sequence::Number(7)));
    }

    #[test]
    fn test_max_sequence_with_duplicate_sequences() {
        let batch = vec![
            change_event("a", 9, &["1-x"]),
            change_event("b", 9, &["1-y"]),
            change_event("c", 3, &["1-z"]),
        ];

        assert_eq!(max_sequence(&batch), Some(&Sequence::Number(9)));
    }

    #[test]
    fn test_max_sequence_of_empty_batch() {
        assert_eq!(max_sequence(&[]), None);
    }

    #[test]
    fn test_numbers_order_numerically() {
        assert!(Sequence::Number(9) < Sequence::Number(10));
        assert!(Sequence::Number(u64::MAX) < Sequence::from("0"));
    }

    #[test]
    fn test_deserialize_feed_entry() {
        let numeric: ChangeEvent = serde_json::from_str(
            r#"{"seq": 12, "id": "doc-1", "changes": [{"rev": "2-b"}, {"rev": "2-c"}]}"#,
        )
        .unwrap();
        assert_eq!(numeric, change_event("doc-1", 12, &["2-b", "2-c"]));

        let opaque: ChangeEvent =
            serde_json::from_str(r#"{"seq": "12-g1AAAA", "id": "doc-1", "changes": []}"#).unwrap();
        assert_eq!(opaque.sequence, Sequence::Text("12-g1AAAA".to_string()));
        assert!(opaque.changes.is_empty());
    }
}
