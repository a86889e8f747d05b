//! Per-source pipeline orchestration.
//!
//! Each source runs the same pass: list scrape → dedup filter →
//! selective detail scrape → validate → batch persist. Sources are
//! independent; a failure in one pass never touches another source's
//! pass or its already-persisted data.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::Settings;
use crate::error::Result;
use crate::models::{JobPosting, RunReport, Source, SourceReport, SourceState};
use crate::pipeline::dedupe::DedupIndex;
use crate::pipeline::validate::validate;
use crate::scrapers::{JobScraper, build_scraper};
use crate::storage::JobStorage;

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Enrich new postings with detail pages
    pub deep_scrape: bool,
    /// Whole-batch write attempts before giving up
    pub write_attempts: u32,
    /// Wall-clock budget for one source's detail phase
    pub detail_budget: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            deep_scrape: true,
            write_attempts: 3,
            detail_budget: None,
        }
    }
}

impl RunOptions {
    pub fn from_settings(settings: &Settings, deep_scrape: bool) -> Self {
        Self {
            deep_scrape,
            detail_budget: settings.scrape.detail_budget(),
            ..Self::default()
        }
    }
}

/// Run the pipeline for every requested source, sequentially.
pub async fn run_all(
    sources: &[Source],
    storage: &dyn JobStorage,
    settings: &Settings,
    options: &RunOptions,
) -> RunReport {
    let mut report = RunReport::new();

    for &source in sources {
        log::info!("Starting scraper: {source}");
        let source_report = run_source(source, storage, settings, options).await;

        match source_report.state {
            SourceState::Done => log::info!(
                "Completed {source}: found {}, new {}, persisted {}",
                source_report.found,
                source_report.found - source_report.already_known,
                source_report.persisted
            ),
            _ => log::error!(
                "Source {source} failed: {}",
                source_report.failure.as_deref().unwrap_or("unknown")
            ),
        }
        report.push(source_report);
    }

    report.finish();
    report
}

/// Run the full pipeline for one source.
///
/// Every per-item failure is reduced to statistics here; only scraper
/// construction, list-surface, index-load, and final-write failures
/// move the pass into `Failed`.
pub async fn run_source(
    source: Source,
    storage: &dyn JobStorage,
    settings: &Settings,
    options: &RunOptions,
) -> SourceReport {
    let mut report = SourceReport::new(source);

    let mut scraper = match build_scraper(source, settings) {
        Ok(scraper) => scraper,
        Err(e) => {
            report.fail(format!("scraper construction: {e}"));
            return report;
        }
    };

    run_stages(source, scraper.as_mut(), storage, options, &mut report).await;
    report
}

/// Drive one already-constructed scraper through the pass.
///
/// Separated from [`run_source`] so tests can inject scraper doubles.
pub async fn run_stages(
    source: Source,
    scraper: &mut dyn JobScraper,
    storage: &dyn JobStorage,
    options: &RunOptions,
    report: &mut SourceReport,
) {
    // Phase 1: list scraping
    report.state = SourceState::ListScraping;
    let listed = match scraper.scrape_list().await {
        Ok(postings) => postings,
        Err(e) => {
            report.fail(format!("list scrape: {e}"));
            return;
        }
    };
    log::info!("Found {} postings from {source} list", listed.len());

    // Phase 2: dedup filter
    report.state = SourceState::Deduplicating;
    let index = match DedupIndex::load(storage, source).await {
        Ok(index) => index,
        Err(e) => {
            report.fail(format!("dedup index load: {e}"));
            return;
        }
    };
    let (new_postings, already_known) = index.partition(listed);
    report.found = new_postings.len() + already_known;
    report.already_known = already_known;
    log::info!(
        "{source}: {} new postings out of {} found",
        new_postings.len(),
        report.found
    );

    // Phase 3: detail scraping (optional)
    let mut postings = new_postings;
    if options.deep_scrape && !postings.is_empty() {
        report.state = SourceState::DetailScraping;
        postings = scrape_details(scraper, postings, options.detail_budget, report).await;
    }

    // Phase 4: validation
    report.state = SourceState::Validating;
    let mut valid = Vec::with_capacity(postings.len());
    for posting in postings {
        match validate(&posting) {
            Ok(()) => valid.push(posting),
            Err(reason) => {
                report.invalid += 1;
                log::warn!("Dropping {}: {reason}", posting.url);
            }
        }
    }
    report.valid = valid.len();

    // Phase 5: persistence
    report.state = SourceState::Persisting;
    match persist_with_retry(storage, source, &valid, options.write_attempts).await {
        Ok(written) => {
            report.persisted = written;
            report.finish();
        }
        Err(e) => {
            report.unsaved = valid.len();
            report.fail(format!("storage write: {e}"));
        }
    }
}

/// Enrich new postings one by one, keeping light records on per-item
/// failures and once the detail budget is spent.
async fn scrape_details(
    scraper: &mut dyn JobScraper,
    postings: Vec<JobPosting>,
    budget: Option<Duration>,
    report: &mut SourceReport,
) -> Vec<JobPosting> {
    let deadline = budget.map(|b| Instant::now() + b);
    let total = postings.len();
    let mut out = Vec::with_capacity(total);

    for (i, posting) in postings.into_iter().enumerate() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::warn!(
                "Detail budget exhausted after {}/{total}; keeping the rest light",
                i
            );
            out.push(posting);
            continue;
        }

        log::info!("  [{}/{total}] {}", i + 1, posting.title);
        match scraper.scrape_detail(&posting).await {
            Ok(Some(enriched)) => {
                report.deep_scraped += 1;
                out.push(enriched);
            }
            Ok(None) => {
                log::warn!("No extractable content at {}; keeping light", posting.url);
                out.push(posting);
            }
            Err(e) => {
                log::warn!("Detail scrape failed for {}: {e}; keeping light", posting.url);
                out.push(posting);
            }
        }
    }
    out
}

/// Write the whole batch, retrying a bounded number of times.
async fn persist_with_retry(
    storage: &dyn JobStorage,
    source: Source,
    postings: &[JobPosting],
    attempts: u32,
) -> Result<usize> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match storage.write_batch(source.partition(), postings).await {
            Ok(written) => return Ok(written),
            Err(e) if attempt < attempts => {
                log::warn!(
                    "Batch write to {} failed (attempt {attempt}/{attempts}): {e}",
                    storage.name()
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::PostingDetail;
    use crate::storage::LocalStorage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Scraper double with scripted list/detail behavior.
    struct StubScraper {
        source: Source,
        listed: Vec<JobPosting>,
        detail_failures_before_success: u32,
        detail_attempts: AtomicU32,
        detail_absent: bool,
    }

    impl StubScraper {
        fn new(source: Source, listed: Vec<JobPosting>) -> Self {
            Self {
                source,
                listed,
                detail_failures_before_success: 0,
                detail_attempts: AtomicU32::new(0),
                detail_absent: false,
            }
        }
    }

    #[async_trait]
    impl JobScraper for StubScraper {
        fn source(&self) -> Source {
            self.source
        }

        async fn scrape_list(&mut self) -> Result<Vec<JobPosting>> {
            Ok(self.listed.clone())
        }

        async fn scrape_detail(&mut self, posting: &JobPosting) -> Result<Option<JobPosting>> {
            let attempt = self.detail_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.detail_failures_before_success {
                return Err(AppError::scrape(posting.url.clone(), "connection reset"));
            }
            if self.detail_absent {
                return Ok(None);
            }
            let mut enriched = posting.clone();
            enriched.merge_detail(PostingDetail {
                content_raw: Some("[detail]\nbody".to_string()),
                ..PostingDetail::default()
            });
            Ok(Some(enriched))
        }
    }

    /// Storage double that always fails writes.
    struct FailingStorage;

    #[async_trait]
    impl JobStorage for FailingStorage {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn load_known_urls(
            &self,
            _partition: &str,
        ) -> Result<std::collections::HashSet<String>> {
            Ok(std::collections::HashSet::new())
        }

        async fn write_batch(&self, _partition: &str, _postings: &[JobPosting]) -> Result<usize> {
            Err(AppError::storage("failing", "quota exceeded"))
        }

        async fn stats(&self, partition: &str) -> Result<crate::storage::PartitionStats> {
            Ok(crate::storage::PartitionStats::empty(partition))
        }
    }

    fn posting(url: &str, title: &str) -> JobPosting {
        let mut p = JobPosting::new(Source::Komate, url, title);
        p.company_kor = Some("회사".to_string());
        p
    }

    fn options(deep: bool) -> RunOptions {
        RunOptions {
            deep_scrape: deep,
            ..RunOptions::default()
        }
    }

    #[tokio::test]
    async fn test_known_urls_skip_detail_scraping() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        storage
            .write_batch("komate", &[posting("https://example.com/a", "A")])
            .await
            .unwrap();

        let mut scraper = StubScraper::new(
            Source::Komate,
            vec![
                posting("https://example.com/a", "A"),
                posting("https://example.com/b", "B"),
                posting("https://example.com/c", "C"),
            ],
        );
        let mut report = SourceReport::new(Source::Komate);
        run_stages(
            Source::Komate,
            &mut scraper,
            &storage,
            &options(true),
            &mut report,
        )
        .await;

        assert_eq!(report.state, SourceState::Done);
        assert_eq!(report.found, 3);
        assert_eq!(report.already_known, 1);
        // Only the two new postings reached detail scraping
        assert_eq!(scraper.detail_attempts.load(Ordering::SeqCst), 2);
        assert_eq!(report.deep_scraped, 2);
        assert_eq!(report.persisted, 2);

        let stats = storage.stats("komate").await.unwrap();
        assert_eq!(stats.total, 3);
    }

    #[tokio::test]
    async fn test_second_run_persists_nothing() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let listed = vec![
            posting("https://example.com/a", "A"),
            posting("https://example.com/b", "B"),
        ];

        for run in 0..2 {
            let mut scraper = StubScraper::new(Source::Komate, listed.clone());
            let mut report = SourceReport::new(Source::Komate);
            run_stages(
                Source::Komate,
                &mut scraper,
                &storage,
                &options(false),
                &mut report,
            )
            .await;

            if run == 0 {
                assert_eq!(report.persisted, 2);
            } else {
                assert_eq!(report.already_known, 2);
                assert_eq!(report.persisted, 0);
            }
        }

        let stats = storage.stats("komate").await.unwrap();
        assert_eq!(stats.total, 2);
    }

    #[tokio::test]
    async fn test_invalid_records_never_reach_storage() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let mut no_title = JobPosting::new(Source::Komate, "https://example.com/x", "");
        no_title.company_kor = Some("Acme".to_string());
        let no_company = JobPosting::new(Source::Komate, "https://example.com/y", "Engineer");

        let mut scraper = StubScraper::new(
            Source::Komate,
            vec![no_title, no_company, posting("https://example.com/z", "Z")],
        );
        let mut report = SourceReport::new(Source::Komate);
        run_stages(
            Source::Komate,
            &mut scraper,
            &storage,
            &options(false),
            &mut report,
        )
        .await;

        assert_eq!(report.invalid, 2);
        assert_eq!(report.valid, 1);
        assert_eq!(report.persisted, 1);

        let urls = storage.load_known_urls("komate").await.unwrap();
        assert_eq!(urls.len(), 1);
        assert!(urls.contains("https://example.com/z"));
    }

    #[tokio::test]
    async fn test_absent_detail_keeps_light_record() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let mut scraper =
            StubScraper::new(Source::Komate, vec![posting("https://example.com/a", "A")]);
        scraper.detail_absent = true;

        let mut report = SourceReport::new(Source::Komate);
        run_stages(
            Source::Komate,
            &mut scraper,
            &storage,
            &options(true),
            &mut report,
        )
        .await;

        assert_eq!(report.state, SourceState::Done);
        assert_eq!(report.deep_scraped, 0);
        assert_eq!(report.persisted, 1);
    }

    #[tokio::test]
    async fn test_detail_error_keeps_light_record() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let mut scraper =
            StubScraper::new(Source::Komate, vec![posting("https://example.com/a", "A")]);
        scraper.detail_failures_before_success = u32::MAX;

        let mut report = SourceReport::new(Source::Komate);
        run_stages(
            Source::Komate,
            &mut scraper,
            &storage,
            &options(true),
            &mut report,
        )
        .await;

        assert_eq!(report.state, SourceState::Done);
        assert_eq!(report.deep_scraped, 0);
        assert_eq!(report.persisted, 1);
    }

    #[tokio::test]
    async fn test_storage_failure_reports_unsaved() {
        let mut scraper = StubScraper::new(
            Source::Komate,
            vec![
                posting("https://example.com/a", "A"),
                posting("https://example.com/b", "B"),
            ],
        );
        let mut report = SourceReport::new(Source::Komate);
        run_stages(
            Source::Komate,
            &mut scraper,
            &FailingStorage,
            &options(false),
            &mut report,
        )
        .await;

        assert_eq!(report.state, SourceState::Failed);
        assert_eq!(report.unsaved, 2);
        assert_eq!(report.persisted, 0);
        assert!(report.failure.as_deref().unwrap().contains("storage write"));
    }

    #[tokio::test]
    async fn test_empty_list_completes_cleanly() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let mut scraper = StubScraper::new(Source::Klik, Vec::new());
        let mut report = SourceReport::new(Source::Klik);
        run_stages(
            Source::Klik,
            &mut scraper,
            &storage,
            &options(true),
            &mut report,
        )
        .await;

        assert_eq!(report.state, SourceState::Done);
        assert_eq!(report.found, 0);
        assert_eq!(report.persisted, 0);
    }
}
