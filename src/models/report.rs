//! Run statistics and per-source reports.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Source;

/// Stage of a per-source pipeline pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    ListScraping,
    Deduplicating,
    DetailScraping,
    Validating,
    Persisting,
    Done,
    Failed,
}

/// Outcome of one source's pipeline pass.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: Source,
    pub state: SourceState,

    /// Distinct postings seen on the listing surface
    pub found: usize,
    /// Postings skipped because their URL was already persisted
    pub already_known: usize,
    /// New postings enriched by detail scraping this run
    pub deep_scraped: usize,
    pub valid: usize,
    pub invalid: usize,
    pub persisted: usize,
    /// Valid records lost to a final storage failure
    pub unsaved: usize,

    /// Reason the pass ended in `Failed`, if it did
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SourceReport {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            state: SourceState::ListScraping,
            found: 0,
            already_known: 0,
            deep_scraped: 0,
            valid: 0,
            invalid: 0,
            persisted: 0,
            unsaved: 0,
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move the pass into the absorbing `Failed` state.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = SourceState::Failed;
        self.failure = Some(reason.into());
        self.finished_at = Some(Utc::now());
    }

    /// Mark the pass complete.
    pub fn finish(&mut self) {
        self.state = SourceState::Done;
        self.finished_at = Some(Utc::now());
    }

    pub fn is_failed(&self) -> bool {
        self.state == SourceState::Failed
    }
}

/// Aggregated outcome of one full run across sources.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn push(&mut self, report: SourceReport) {
        self.sources.push(report);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn total_persisted(&self) -> usize {
        self.sources.iter().map(|s| s.persisted).sum()
    }

    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.is_failed())
    }

    pub fn has_failures(&self) -> bool {
        self.sources.iter().any(|s| s.is_failed())
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
