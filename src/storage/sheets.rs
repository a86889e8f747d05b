//! Google Sheets storage implementation.
//!
//! One sheet per partition inside a single spreadsheet. The sheet is
//! expected to exist with the contract header row in place; batches go
//! out as a single `values:append` call to keep external-API usage at
//! one round trip per batch.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::models::JobPosting;
use crate::storage::{JobStorage, PartitionStats, coverage_from_rows};

/// Google Sheets storage backend.
pub struct SheetsStorage {
    client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    token: String,
}

/// Subset of the Sheets `ValueRange` response.
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

impl SheetsStorage {
    /// Create a Sheets storage from settings; fails when the
    /// spreadsheet id or token is missing.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let sheets = &settings.storage.sheets;
        let spreadsheet_id = sheets
            .spreadsheet_id
            .clone()
            .ok_or_else(|| AppError::config("GOOGLE_SHEETS_ID is not set"))?;
        let token = sheets
            .token
            .clone()
            .ok_or_else(|| AppError::config("GOOGLE_SHEETS_TOKEN is not set"))?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: sheets.base_url.trim_end_matches('/').to_string(),
            spreadsheet_id,
            token,
        })
    }

    /// Create a Sheets storage against an explicit endpoint (tests).
    pub fn with_endpoint(
        base_url: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            spreadsheet_id: spreadsheet_id.into(),
            token: token.into(),
        }
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url, self.spreadsheet_id, range
        )
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let resp = self
            .client
            .get(self.values_url(range))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::storage("sheets", format!("{status}: {body}")));
        }

        let range: ValueRange = resp.json().await?;
        Ok(range.values)
    }
}

#[async_trait]
impl JobStorage for SheetsStorage {
    fn name(&self) -> &'static str {
        "sheets"
    }

    async fn load_known_urls(&self, partition: &str) -> Result<HashSet<String>> {
        let rows = self.get_values(&format!("{partition}!A2:A")).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter(|url| !url.is_empty())
            .collect())
    }

    async fn write_batch(&self, partition: &str, postings: &[JobPosting]) -> Result<usize> {
        if postings.is_empty() {
            return Ok(0);
        }

        let rows: Vec<Vec<String>> = postings.iter().map(JobPosting::to_row).collect();
        let url = format!(
            "{}:append?valueInputOption=RAW",
            self.values_url(&format!("{partition}!A1"))
        );

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({ "values": rows }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::storage("sheets", format!("{status}: {body}")));
        }

        log::info!(
            "Appended {} postings to sheet '{}'",
            postings.len(),
            partition
        );
        Ok(postings.len())
    }

    async fn stats(&self, partition: &str) -> Result<PartitionStats> {
        let rows = self.get_values(&format!("{partition}!A2:N")).await?;
        Ok(PartitionStats {
            partition: partition.to_string(),
            total: rows.len(),
            field_coverage: coverage_from_rows(&rows),
        })
    }
}
