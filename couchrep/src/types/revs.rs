use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::bail;
use crate::error::{ErrorKind, RepError, RepResult};
use crate::types::ChangeEvent;

/// Revisions of each document of a batch, as sent to the target peer in a revision diff.
///
/// Each `(doc_id, rev)` pair appears at most once and revisions keep the order in which they
/// were first seen in the batch. Serializes to the `_revs_diff` request body
/// (`{"doc_id": ["rev", ...]}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DocumentRevisionSet(BTreeMap<String, Vec<String>>);

impl DocumentRevisionSet {
    /// Flattens a batch of change events into a [`DocumentRevisionSet`].
    ///
    /// The same document may be updated several times within one batch, reporting some of its
    /// leaf revisions more than once. Duplicates are dropped so they don't inflate the
    /// revision-diff request.
    pub fn from_batch(batch: &[ChangeEvent]) -> Self {
        let mut revisions: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut seen: HashSet<(&str, &str)> = HashSet::new();

        for event in batch {
            for change in &event.changes {
                if !seen.insert((event.doc_id.as_str(), change.rev.as_str())) {
                    continue;
                }

                revisions
                    .entry(event.doc_id.clone())
                    .or_default()
                    .push(change.rev.clone());
            }
        }

        Self(revisions)
    }

    /// Returns the revisions requested for `doc_id`.
    pub fn get(&self, doc_id: &str) -> Option<&[String]> {
        self.0.get(doc_id).map(Vec::as_slice)
    }

    pub fn contains_doc(&self, doc_id: &str) -> bool {
        self.0.contains_key(doc_id)
    }

    /// Returns the number of documents in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the total number of revisions across all documents.
    pub fn revisions_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .map(|(doc_id, revs)| (doc_id.as_str(), revs.as_slice()))
    }
}

/// Entry of a revision-diff response for a single document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevsDiffEntry {
    pub missing: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub possible_ancestors: Vec<String>,
}

/// Raw revision-diff response of the target peer.
///
/// Only documents with at least one missing revision are expected to be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevsDiffResponse(BTreeMap<String, RevsDiffEntry>);

impl RevsDiffResponse {
    /// Parses a JSON revision-diff response body.
    ///
    /// A body that doesn't match the expected shape is a protocol violation of the peer.
    pub fn from_slice(body: &[u8]) -> RepResult<Self> {
        serde_json::from_slice(body).map_err(|err| {
            RepError::from((
                ErrorKind::TargetProtocolViolation,
                "Malformed revision diff response",
                err.to_string(),
            ))
        })
    }

    pub fn insert(&mut self, doc_id: impl Into<String>, entry: RevsDiffEntry) {
        self.0.insert(doc_id.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, RevsDiffEntry)> for RevsDiffResponse {
    fn from_iter<T: IntoIterator<Item = (String, RevsDiffEntry)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Revisions of a document that the target peer doesn't have.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingRevisions {
    pub missing: Vec<String>,
    pub possible_ancestors: Vec<String>,
}

/// Missing revisions of every document of a batch, keyed by document id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingRevisionsResult(BTreeMap<String, MissingRevisions>);

impl MissingRevisionsResult {
    /// Translates the revision-diff `response` to the `requested` revision set.
    ///
    /// Fails with [`ErrorKind::TargetProtocolViolation`] when the response mentions a
    /// document that was not part of the request.
    pub fn from_revs_diff(
        requested: &DocumentRevisionSet,
        response: RevsDiffResponse,
    ) -> RepResult<Self> {
        let mut result = BTreeMap::new();

        for (doc_id, entry) in response.0 {
            if !requested.contains_doc(&doc_id) {
                bail!(
                    ErrorKind::TargetProtocolViolation,
                    "Revision diff response references a document that was not requested",
                    format!("The document '{doc_id}' was not part of the revision diff request")
                );
            }

            result.insert(
                doc_id,
                MissingRevisions {
                    missing: entry.missing,
                    possible_ancestors: entry.possible_ancestors,
                },
            );
        }

        Ok(Self(result))
    }

    pub fn get(&self, doc_id: &str) -> Option<&MissingRevisions> {
        self.0.get(doc_id)
    }

    /// Returns the number of documents with an entry.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the total number of missing revisions across all documents.
    pub fn missing_count(&self) -> usize {
        self.0.values().map(|revs| revs.missing.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MissingRevisions)> {
        self.0.iter().map(|(doc_id, revs)| (doc_id.as_str(), revs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::event::change_event;

    fn revs(revs: &[&str]) -> Vec<String> {
        revs.iter().map(|rev| rev.to_string()).collect()
    }

    #[test]
    fn test_revision_set_deduplicates_within_batch() {
        let batch = vec![
            change_event("a", 5, &["1-x"]),
            change_event("a", 7, &["1-x", "2-y"]),
            change_event("b", 6, &["1-z"]),
        ];

        let revision_set = DocumentRevisionSet::from_batch(&batch);

        assert_eq!(revision_set.len(), 2);
        assert_eq!(revision_set.get("a"), Some(revs(&["1-x", "2-y"]).as_slice()));
        assert_eq!(revision_set.get("b"), Some(revs(&["1-z"]).as_slice()));
        assert_eq!(revision_set.revisions_count(), 3);
    }

    #[test]
    fn test_revision_set_keeps_first_seen_order() {
        let batch = vec![
            change_event("a", 1, &["3-c", "1-a"]),
            change_event("a", 2, &["2-b", "3-c", "1-a"]),
            change_event("a", 3, &["3-c"]),
        ];

        let revision_set = DocumentRevisionSet::from_batch(&batch);

        assert_eq!(
            revision_set.get("a"),
            Some(revs(&["3-c", "1-a", "2-b"]).as_slice())
        );
    }

    #[test]
    fn test_same_revision_on_different_documents_is_kept() {
        let batch = vec![change_event("a", 1, &["1-x"]), change_event("b", 2, &["1-x"])];

        let revision_set = DocumentRevisionSet::from_batch(&batch);

        assert_eq!(revision_set.get("a"), Some(revs(&["1-x"]).as_slice()));
        assert_eq!(revision_set.get("b"), Some(revs(&["1-x"]).as_slice()));
    }

    #[test]
    fn test_revision_set_serializes_as_request_body() {
        let batch = vec![change_event("b", 1, &["1-z"]), change_event("a", 2, &["1-x"])];

        let body = serde_json::to_value(DocumentRevisionSet::from_batch(&batch)).unwrap();

        assert_eq!(body, serde_json::json!({"a": ["1-x"], "b": ["1-z"]}));
    }

    #[test]
    fn test_missing_revisions_default_possible_ancestors() {
        let batch = vec![
            change_event("a", 5, &["1-x"]),
            change_event("a", 7, &["1-x", "2-y"]),
            change_event("b", 6, &["1-z"]),
        ];
        let requested = DocumentRevisionSet::from_batch(&batch);
        let response = RevsDiffResponse::from_slice(
            br#"{"a": {"missing": ["2-y"]}, "b": {"missing": [], "possible_ancestors": ["1-z"]}}"#,
        )
        .unwrap();

        let result = MissingRevisionsResult::from_revs_diff(&requested, response).unwrap();

        assert_eq!(
            result.get("a"),
            Some(&MissingRevisions {
                missing: revs(&["2-y"]),
                possible_ancestors: vec![],
            })
        );
        assert_eq!(
            result.get("b"),
            Some(&MissingRevisions {
                missing: vec![],
                possible_ancestors: revs(&["1-z"]),
            })
        );
        assert_eq!(result.missing_count(), 1);
    }

    #[test]
    fn test_unrequested_document_is_a_protocol_violation() {
        let requested = DocumentRevisionSet::from_batch(&[change_event("a", 1, &["1-x"])]);
        let response: RevsDiffResponse = [(
            "ghost".to_string(),
            RevsDiffEntry {
                missing: revs(&["1-x"]),
                possible_ancestors: vec![],
            },
        )]
        .into_iter()
        .collect();

        let err = MissingRevisionsResult::from_revs_diff(&requested, response).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TargetProtocolViolation);
        assert!(err.detail().unwrap().contains("ghost"));
    }

    #[test]
    fn test_malformed_response_is_a_protocol_violation() {
        let err = RevsDiffResponse::from_slice(br#"{"a": {"possible_ancestors": []}}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TargetProtocolViolation);

        let err = RevsDiffResponse::from_slice(b"<html>502 Bad Gateway</html>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TargetProtocolViolation);
    }
}
