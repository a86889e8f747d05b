//! Local CSV storage implementation.
//!
//! One CSV file per partition, `{data_dir}/job_postings_{partition}.csv`,
//! the file-based equivalent of one spreadsheet sheet per source. The
//! header row is written once when a file is created; batches are
//! appended with a single flush.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{COLUMNS, JobPosting};
use crate::storage::{JobStorage, PartitionStats, coverage_from_rows};

/// CSV-file storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    data_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// CSV file path for a partition.
    fn partition_path(&self, partition: &str) -> PathBuf {
        self.data_dir.join(format!("job_postings_{partition}.csv"))
    }

    /// Read all data rows of a partition (header excluded).
    fn read_rows(&self, partition: &str) -> Result<Vec<Vec<String>>> {
        let path = self.partition_path(partition);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }
}

#[async_trait]
impl JobStorage for LocalStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn load_known_urls(&self, partition: &str) -> Result<HashSet<String>> {
        let path = self.partition_path(partition);
        if !path.exists() {
            log::info!("No existing data file: {}", path.display());
            return Ok(HashSet::new());
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let url_index = reader
            .headers()?
            .iter()
            .position(|h| h == "url")
            .ok_or_else(|| AppError::storage("local", "missing url column"))?;

        let mut urls = HashSet::new();
        for record in reader.records() {
            let record = record?;
            if let Some(url) = record.get(url_index) {
                if !url.is_empty() {
                    urls.insert(url.to_string());
                }
            }
        }
        Ok(urls)
    }

    async fn write_batch(&self, partition: &str, postings: &[JobPosting]) -> Result<usize> {
        if postings.is_empty() {
            return Ok(0);
        }

        std::fs::create_dir_all(&self.data_dir)?;
        let path = self.partition_path(partition);
        let write_header = !path.exists();

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if write_header {
            writer.write_record(COLUMNS)?;
        }
        for posting in postings {
            writer.write_record(posting.to_row())?;
        }
        writer.flush()?;

        log::info!(
            "Saved {} postings to {}",
            postings.len(),
            path.display()
        );
        Ok(postings.len())
    }

    async fn stats(&self, partition: &str) -> Result<PartitionStats> {
        let rows = self.read_rows(partition)?;
        Ok(PartitionStats {
            partition: partition.to_string(),
            total: rows.len(),
            field_coverage: coverage_from_rows(&rows),
        })
    }
}
