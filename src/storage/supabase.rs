//! Supabase (PostgREST) storage implementation.
//!
//! All sources share one table; a partition maps to the `source`
//! column, filtered on read and carried by each row on write. The
//! backend is a plain append target: no upsert, no dedup of its own —
//! the dedup index in front of it is the only dedup authority.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::models::{COLUMNS, JobPosting};
use crate::storage::{JobStorage, PartitionStats};

/// Supabase storage backend.
pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    key: String,
    table: String,
}

#[derive(Debug, Deserialize)]
struct UrlRow {
    url: String,
}

impl SupabaseStorage {
    /// Create a Supabase storage from settings; fails when the project
    /// URL or key is missing.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let supabase = &settings.storage.supabase;
        let base_url = supabase
            .url
            .clone()
            .ok_or_else(|| AppError::config("SUPABASE_URL is not set"))?;
        let key = supabase
            .key
            .clone()
            .ok_or_else(|| AppError::config("SUPABASE_ANON_KEY is not set"))?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            key,
            table: supabase.table.clone(),
        })
    }

    /// Create a Supabase storage against an explicit endpoint (tests).
    pub fn with_endpoint(
        base_url: impl Into<String>,
        key: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            key: key.into(),
            table: table.into(),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    async fn select(&self, query: &[(&str, &str)]) -> Result<Vec<Value>> {
        let resp = self
            .request(self.client.get(self.table_url()).query(query))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::storage("supabase", format!("{status}: {body}")));
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl JobStorage for SupabaseStorage {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn load_known_urls(&self, partition: &str) -> Result<HashSet<String>> {
        let filter = format!("eq.{partition}");
        let rows = self
            .select(&[("select", "url"), ("source", filter.as_str())])
            .await?;

        let mut urls = HashSet::new();
        for row in rows {
            let row: UrlRow = serde_json::from_value(row)?;
            urls.insert(row.url);
        }
        Ok(urls)
    }

    async fn write_batch(&self, partition: &str, postings: &[JobPosting]) -> Result<usize> {
        if postings.is_empty() {
            return Ok(0);
        }

        debug_assert!(postings.iter().all(|p| p.source.partition() == partition));

        let resp = self
            .request(self.client.post(self.table_url()))
            .header("Prefer", "return=representation")
            .json(postings)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::storage("supabase", format!("{status}: {body}")));
        }

        let inserted: Vec<Value> = resp.json().await?;
        log::info!(
            "Inserted {} postings into table '{}'",
            inserted.len(),
            self.table
        );
        Ok(inserted.len())
    }

    async fn stats(&self, partition: &str) -> Result<PartitionStats> {
        let filter = format!("eq.{partition}");
        let rows = self
            .select(&[("select", "*"), ("source", filter.as_str())])
            .await?;

        let mut field_coverage: BTreeMap<String, usize> = BTreeMap::new();
        for column in COLUMNS {
            let count = rows
                .iter()
                .filter(|row| match row.get(column) {
                    None | Some(Value::Null) => false,
                    Some(Value::String(s)) => !s.trim().is_empty(),
                    Some(_) => true,
                })
                .count();
            field_coverage.insert(column.to_string(), count);
        }

        Ok(PartitionStats {
            partition: partition.to_string(),
            total: rows.len(),
            field_coverage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn storage(server: &MockServer) -> SupabaseStorage {
        SupabaseStorage::with_endpoint(server.uri(), "anon-key", "job_postings")
    }

    fn posting(url: &str) -> JobPosting {
        let mut p = JobPosting::new(Source::Klik, url, "Engineer");
        p.company_kor = Some("회사".to_string());
        p
    }

    #[tokio::test]
    async fn test_load_known_urls_filters_by_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/job_postings"))
            .and(query_param("select", "url"))
            .and(query_param("source", "eq.klik"))
            .and(header("apikey", "anon-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "url": "https://www.klik.co.kr/jobs/a1" },
                { "url": "https://www.klik.co.kr/jobs/b2" }
            ])))
            .mount(&server)
            .await;

        let urls = storage(&server).load_known_urls("klik").await.unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls.contains("https://www.klik.co.kr/jobs/a1"));
    }

    #[tokio::test]
    async fn test_write_batch_plain_insert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/job_postings"))
            .and(header("prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([
                { "url": "https://www.klik.co.kr/jobs/a1" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let written = storage(&server)
            .write_batch("klik", &[posting("https://www.klik.co.kr/jobs/a1")])
            .await
            .unwrap();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn test_write_batch_empty_makes_no_request() {
        let server = MockServer::start().await;
        let written = storage(&server).write_batch("klik", &[]).await.unwrap();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn test_write_batch_surfaces_schema_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/job_postings"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string("column \"visa\" does not exist"),
            )
            .mount(&server)
            .await;

        let err = storage(&server)
            .write_batch("klik", &[posting("https://www.klik.co.kr/jobs/a1")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Storage {
                backend: "supabase",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_stats_counts_field_coverage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/job_postings"))
            .and(query_param("select", "*"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "url": "https://www.klik.co.kr/jobs/a1",
                    "title": "Engineer",
                    "company_kor": "회사",
                    "content_raw": null,
                    "e7_support": false,
                    "source": "klik"
                },
                {
                    "url": "https://www.klik.co.kr/jobs/b2",
                    "title": "Analyst",
                    "company_kor": "",
                    "content_raw": "body",
                    "e7_support": true,
                    "source": "klik"
                }
            ])))
            .mount(&server)
            .await;

        let stats = storage(&server).stats("klik").await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.field_coverage["url"], 2);
        assert_eq!(stats.field_coverage["content_raw"], 1);
        assert_eq!(stats.field_coverage["company_kor"], 1);
        // booleans always count, false included
        assert_eq!(stats.field_coverage["e7_support"], 2);
    }

    #[tokio::test]
    async fn test_from_settings_requires_credentials() {
        let settings = Settings::default();
        assert!(SupabaseStorage::from_settings(&settings).is_err());
    }
}
