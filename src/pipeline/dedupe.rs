//! Deduplication index over already-persisted posting URLs.
//!
//! Loaded once per source pass from the active storage backend and
//! read-only for the rest of the run; writes made by the same run are
//! deliberately not observed.

use std::collections::HashSet;

use crate::error::Result;
use crate::models::{JobPosting, Source};
use crate::storage::JobStorage;

/// Set of URLs already durably persisted for one source partition.
#[derive(Debug, Default)]
pub struct DedupIndex {
    urls: HashSet<String>,
}

impl DedupIndex {
    /// Load the index for a source from the storage backend.
    pub async fn load(storage: &dyn JobStorage, source: Source) -> Result<Self> {
        let urls = storage.load_known_urls(source.partition()).await?;
        log::info!(
            "Loaded {} known URLs for {} from {}",
            urls.len(),
            source,
            storage.name()
        );
        Ok(Self { urls })
    }

    /// Build an index from an explicit URL set.
    pub fn from_urls(urls: impl IntoIterator<Item = String>) -> Self {
        Self {
            urls: urls.into_iter().collect(),
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Split a listing batch into postings new to the backend and the
    /// count of already-known ones.
    ///
    /// Duplicate URLs within the batch itself are collapsed first, so
    /// a posting listed twice on one surface is processed once.
    pub fn partition(&self, postings: Vec<JobPosting>) -> (Vec<JobPosting>, usize) {
        let mut seen: HashSet<String> = HashSet::new();
        let mut fresh = Vec::new();
        let mut already_known = 0;

        for posting in postings {
            if !seen.insert(posting.url.clone()) {
                continue;
            }
            if self.contains(&posting.url) {
                already_known += 1;
            } else {
                fresh.push(posting);
            }
        }

        (fresh, already_known)
    }
}
