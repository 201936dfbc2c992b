use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::RepResult;
use crate::peer::base::TargetPeer;
use crate::types::{DocumentRevisionSet, RevsDiffEntry, RevsDiffResponse};

/// Returns the generation of a `N-hash` revision, if it has one.
fn rev_generation(rev: &str) -> Option<u64> {
    rev.split_once('-')
        .and_then(|(generation, _)| generation.parse().ok())
}

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<String, BTreeSet<String>>,
}

/// Target peer keeping the known revisions of every document in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTargetPeer {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryTargetPeer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `revs` as known revisions of `doc_id`.
    pub async fn insert_revisions<I, R>(&self, doc_id: &str, revs: I)
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        let mut inner = self.inner.write().await;
        inner
            .documents
            .entry(doc_id.to_string())
            .or_default()
            .extend(revs.into_iter().map(Into::into));
    }

    /// Returns the known revisions of `doc_id`, sorted.
    pub async fn revisions(&self, doc_id: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .documents
            .get(doc_id)
            .map(|revs| revs.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl TargetPeer for MemoryTargetPeer {
    async fn revs_diff(&self, revisions: &DocumentRevisionSet) -> RepResult<RevsDiffResponse> {
        let inner = self.inner.read().await;
        let mut response = RevsDiffResponse::default();

        for (doc_id, revs) in revisions.iter() {
            let known = inner.documents.get(doc_id);
            let missing: Vec<String> = revs
                .iter()
                .filter(|rev| !known.is_some_and(|known| known.contains(*rev)))
                .cloned()
                .collect();

            if missing.is_empty() {
                continue;
            }

            // Known revisions older than a missing one may be its ancestors.
            let newest_missing = missing.iter().filter_map(|rev| rev_generation(rev)).max();
            let possible_ancestors = match (known, newest_missing) {
                (Some(known), Some(newest_missing)) => known
                    .iter()
                    .filter(|rev| rev_generation(rev).is_some_and(|g| g < newest_missing))
                    .cloned()
                    .collect(),
                _ => vec![],
            };

            response.insert(
                doc_id,
                RevsDiffEntry {
                    missing,
                    possible_ancestors,
                },
            );
        }

        debug!(
            "memory target answered revision diff for {} documents with {} entries",
            revisions.len(),
            response.len()
        );

        Ok(response)
    }
}
