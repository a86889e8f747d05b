//! Storage abstractions for job posting persistence.
//!
//! Each backend exposes the same three operations over a named
//! partition (one sheet/table/file per source): read back the known
//! URLs, append a validated batch, and report partition statistics.
//! Backends are dumb append targets; deduplication is exclusively the
//! orchestrator's job via the dedup index.

pub mod local;
pub mod sheets;
pub mod supabase;

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::models::{COLUMNS, JobPosting};

// Re-export for convenience
pub use local::LocalStorage;
pub use sheets::SheetsStorage;
pub use supabase::SupabaseStorage;

/// Row count and field coverage for one partition.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionStats {
    pub partition: String,
    pub total: usize,
    /// Non-empty cell count per contract column
    pub field_coverage: BTreeMap<String, usize>,
}

impl PartitionStats {
    pub fn empty(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            total: 0,
            field_coverage: BTreeMap::new(),
        }
    }
}

/// Trait for job posting storage backends.
#[async_trait]
pub trait JobStorage: Send + Sync {
    /// Backend label used in logs and error reports.
    fn name(&self) -> &'static str;

    /// Every URL previously persisted to the partition, read from
    /// durable state.
    async fn load_known_urls(&self, partition: &str) -> Result<HashSet<String>>;

    /// Append validated records to the partition in one logical write.
    ///
    /// An empty batch is a no-op. Returns the number of records
    /// written.
    async fn write_batch(&self, partition: &str, postings: &[JobPosting]) -> Result<usize>;

    /// Row count and per-field coverage for the partition.
    async fn stats(&self, partition: &str) -> Result<PartitionStats>;
}

/// Known storage backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Local,
    Sheets,
    Supabase,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "local",
            StorageKind::Sheets => "sheets",
            StorageKind::Supabase => "supabase",
        }
    }
}

impl FromStr for StorageKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" | "csv" => Ok(StorageKind::Local),
            "sheets" | "spreadsheet" => Ok(StorageKind::Sheets),
            "supabase" => Ok(StorageKind::Supabase),
            other => Err(AppError::config(format!("Unknown storage kind: {other}"))),
        }
    }
}

/// Build the configured storage backend.
///
/// Remote backends fail here, before any scraping starts, when their
/// credentials are missing.
pub fn build_storage(kind: StorageKind, settings: &Settings) -> Result<Box<dyn JobStorage>> {
    Ok(match kind {
        StorageKind::Local => Box::new(LocalStorage::new(&settings.storage.data_dir)),
        StorageKind::Sheets => Box::new(SheetsStorage::from_settings(settings)?),
        StorageKind::Supabase => Box::new(SupabaseStorage::from_settings(settings)?),
    })
}

/// Count non-empty cells per contract column over tabular rows.
pub(crate) fn coverage_from_rows(rows: &[Vec<String>]) -> BTreeMap<String, usize> {
    let mut coverage: BTreeMap<String, usize> = BTreeMap::new();
    for (i, column) in COLUMNS.iter().enumerate() {
        let count = rows
            .iter()
            .filter(|row| row.get(i).is_some_and(|cell| !cell.trim().is_empty()))
            .count();
        coverage.insert((*column).to_string(), count);
    }
    coverage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;

    #[test]
    fn test_storage_kind_parsing() {
        assert_eq!("local".parse::<StorageKind>().unwrap(), StorageKind::Local);
        assert_eq!(
            "spreadsheet".parse::<StorageKind>().unwrap(),
            StorageKind::Sheets
        );
        assert_eq!(
            "Supabase".parse::<StorageKind>().unwrap(),
            StorageKind::Supabase
        );
        assert!("redis".parse::<StorageKind>().is_err());
    }

    #[test]
    fn test_coverage_from_rows() {
        let mut deep = JobPosting::new(Source::Kowork, "https://kowork.kr/en/post/1", "Engineer");
        deep.company_kor = Some("회사".to_string());
        deep.content_raw = Some("body".to_string());

        let light = {
            let mut p = JobPosting::new(Source::Kowork, "https://kowork.kr/en/post/2", "Analyst");
            p.company_eng = Some("Acme".to_string());
            p
        };

        let rows = vec![deep.to_row(), light.to_row()];
        let coverage = coverage_from_rows(&rows);

        assert_eq!(coverage["url"], 2);
        assert_eq!(coverage["company_kor"], 1);
        assert_eq!(coverage["company_eng"], 1);
        assert_eq!(coverage["content_raw"], 1);
        // e7_support renders Y/N, never empty
        assert_eq!(coverage["e7_support"], 2);
    }
}
