//! Application configuration structures.
//!
//! Settings come from a TOML file; credential material (Supabase key,
//! Sheets token) is overlaid from environment variables so it never has
//! to live in the config file.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Source;
use crate::scrapers::RateLimitConfig;
use crate::storage::StorageKind;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Storage backend selection and credentials
    #[serde(default)]
    pub storage: StorageSettings,

    /// HTTP and scraping behavior settings
    #[serde(default)]
    pub scrape: ScrapeSettings,
}

impl Settings {
    /// Load configuration from a TOML file and overlay the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut settings: Settings = toml::from_str(&content)?;
        settings.apply_env();
        Ok(settings)
    }

    /// Load configuration or return environment-overlaid defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            let mut settings = Self::default();
            settings.apply_env();
            settings
        })
    }

    /// Overlay credentials and deployment knobs from the environment.
    fn apply_env(&mut self) {
        let overlay = |target: &mut Option<String>, key: &str| {
            if let Ok(value) = env::var(key) {
                if !value.trim().is_empty() {
                    *target = Some(value);
                }
            }
        };

        if let Ok(kind) = env::var("STORAGE_TYPE") {
            if !kind.trim().is_empty() {
                self.storage.kind = kind;
            }
        }
        if let Ok(dir) = env::var("DATA_DIR") {
            if !dir.trim().is_empty() {
                self.storage.data_dir = PathBuf::from(dir);
            }
        }

        overlay(&mut self.storage.supabase.url, "SUPABASE_URL");
        overlay(&mut self.storage.supabase.key, "SUPABASE_ANON_KEY");
        if self.storage.supabase.key.is_none() {
            overlay(&mut self.storage.supabase.key, "SUPABASE_KEY");
        }
        if let Ok(table) = env::var("SUPABASE_TABLE") {
            if !table.trim().is_empty() {
                self.storage.supabase.table = table;
            }
        }

        overlay(&mut self.storage.sheets.spreadsheet_id, "GOOGLE_SHEETS_ID");
        overlay(&mut self.storage.sheets.token, "GOOGLE_SHEETS_TOKEN");
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        self.storage.kind.parse::<StorageKind>()?;

        if self.scrape.user_agent.trim().is_empty() {
            return Err(AppError::config("scrape.user_agent is empty"));
        }
        if self.scrape.timeout_secs == 0 {
            return Err(AppError::config("scrape.timeout_secs must be > 0"));
        }
        if self.scrape.base_delay_ms == 0 {
            return Err(AppError::config("scrape.base_delay_ms must be > 0"));
        }
        if self.scrape.max_delay_ms < self.scrape.base_delay_ms {
            return Err(AppError::config(
                "scrape.max_delay_ms must be >= scrape.base_delay_ms",
            ));
        }
        if self.scrape.max_attempts == 0 {
            return Err(AppError::config("scrape.max_attempts must be > 0"));
        }
        if self.scrape.max_pages == 0 {
            return Err(AppError::config("scrape.max_pages must be > 0"));
        }
        Ok(())
    }
}

/// Storage backend selection and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Backend kind: local | sheets | supabase
    #[serde(default = "defaults::storage_kind")]
    pub kind: String,

    /// Directory for local data files (CSV output, session files)
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub supabase: SupabaseSettings,

    #[serde(default)]
    pub sheets: SheetsSettings,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            kind: defaults::storage_kind(),
            data_dir: defaults::data_dir(),
            supabase: SupabaseSettings::default(),
            sheets: SheetsSettings::default(),
        }
    }
}

/// Supabase (PostgREST) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseSettings {
    /// Project URL, e.g. `https://xyz.supabase.co`
    #[serde(default)]
    pub url: Option<String>,

    /// anon/service key
    #[serde(default)]
    pub key: Option<String>,

    /// Table holding all postings, partitioned by the `source` column
    #[serde(default = "defaults::supabase_table")]
    pub table: String,
}

impl Default for SupabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            table: defaults::supabase_table(),
        }
    }
}

/// Google Sheets connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsSettings {
    #[serde(default)]
    pub spreadsheet_id: Option<String>,

    /// OAuth bearer token for the Sheets API
    #[serde(default)]
    pub token: Option<String>,

    /// API endpoint, overridable for testing
    #[serde(default = "defaults::sheets_base_url")]
    pub base_url: String,
}

impl Default for SheetsSettings {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            token: None,
            base_url: defaults::sheets_base_url(),
        }
    }
}

/// HTTP client and scraping behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeSettings {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Minimum delay between requests to one source, in milliseconds
    #[serde(default = "defaults::base_delay")]
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "defaults::max_delay")]
    pub max_delay_ms: u64,

    /// Attempts per item before giving up on it
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Listing pagination cap
    #[serde(default = "defaults::max_pages")]
    pub max_pages: usize,

    /// Wall-clock budget for one source's detail phase, in seconds
    #[serde(default)]
    pub detail_budget_secs: Option<u64>,

    /// Per-source overrides, keyed by source name
    #[serde(default)]
    pub overrides: HashMap<String, SourceOverride>,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            base_delay_ms: defaults::base_delay(),
            max_delay_ms: defaults::max_delay(),
            max_attempts: defaults::max_attempts(),
            max_pages: defaults::max_pages(),
            detail_budget_secs: None,
            overrides: HashMap::new(),
        }
    }
}

/// Per-source override of the scrape defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourceOverride {
    #[serde(default)]
    pub base_delay_ms: Option<u64>,

    #[serde(default)]
    pub max_delay_ms: Option<u64>,

    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Listing URL override (staging/test endpoints)
    #[serde(default)]
    pub list_url: Option<String>,
}

impl ScrapeSettings {
    fn override_for(&self, source: Source) -> Option<&SourceOverride> {
        self.overrides.get(source.as_str())
    }

    /// Rate-limit policy for one source, with overrides applied.
    pub fn rate_limit(&self, source: Source) -> RateLimitConfig {
        let o = self.override_for(source);
        RateLimitConfig {
            base_delay: Duration::from_millis(
                o.and_then(|o| o.base_delay_ms).unwrap_or(self.base_delay_ms),
            ),
            max_delay: Duration::from_millis(
                o.and_then(|o| o.max_delay_ms).unwrap_or(self.max_delay_ms),
            ),
            max_attempts: o.and_then(|o| o.max_attempts).unwrap_or(self.max_attempts),
        }
    }

    /// Listing URL override for one source, if configured.
    pub fn list_url_override(&self, source: Source) -> Option<&str> {
        self.override_for(source).and_then(|o| o.list_url.as_deref())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn detail_budget(&self) -> Option<Duration> {
        self.detail_budget_secs.map(Duration::from_secs)
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn storage_kind() -> String {
        "local".into()
    }
    pub fn data_dir() -> PathBuf {
        PathBuf::from("data")
    }
    pub fn supabase_table() -> String {
        "job_postings".into()
    }
    pub fn sheets_base_url() -> String {
        "https://sheets.googleapis.com".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; krjobs/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn base_delay() -> u64 {
        1500
    }
    pub fn max_delay() -> u64 {
        24_000
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn max_pages() -> usize {
        10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_settings_ok() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_unknown_storage_kind() {
        let mut settings = Settings::default();
        settings.storage.kind = "mongodb".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let mut settings = Settings::default();
        settings.scrape.max_attempts = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_ceiling_below_base() {
        let mut settings = Settings::default();
        settings.scrape.base_delay_ms = 5000;
        settings.scrape.max_delay_ms = 1000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rate_limit_uses_source_override() {
        let mut settings = Settings::default();
        settings.scrape.overrides.insert(
            "kowork".to_string(),
            SourceOverride {
                base_delay_ms: Some(2000),
                ..SourceOverride::default()
            },
        );

        let kowork = settings.scrape.rate_limit(Source::Kowork);
        assert_eq!(kowork.base_delay, Duration::from_millis(2000));

        let klik = settings.scrape.rate_limit(Source::Klik);
        assert_eq!(klik.base_delay, Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
            [storage]
            kind = "supabase"

            [scrape]
            base_delay_ms = 800

            [scrape.overrides.klik]
            max_attempts = 5
        "#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.storage.kind, "supabase");
        assert_eq!(settings.scrape.base_delay_ms, 800);
        assert_eq!(settings.scrape.rate_limit(Source::Klik).max_attempts, 5);
        // Untouched fields keep their defaults
        assert_eq!(settings.scrape.timeout_secs, 30);
    }
}
