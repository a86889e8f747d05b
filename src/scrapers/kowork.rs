//! KOWORK (kowork.kr) adapter.
//!
//! Public employment service listing jobs for foreigners, scraped via
//! the English surface. Detail pages are organized as `h2` sections
//! (Job Description / Qualifications / Preferred / Etc / Preferred
//! Visas / Benefits). A pre-authenticated session cookie file may be
//! present in the data directory; without one the adapter runs against
//! public data only.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use scraper::Html;
use serde::Deserialize;
use url::Url;

use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::models::{JobPosting, KoreanLevel, PostingDetail, Source};
use crate::scrapers::{
    JobScraper, RateLimiter, element_text, next_sibling_element, paginate_list, parse_selector,
    truncate_chars,
};
use crate::utils::http;

const SESSION_FILE: &str = "kowork_session.json";

/// Session warning threshold before expiry.
const SESSION_EXPIRY_WARN_SECS: i64 = 600;

static DEADLINE_RE: OnceLock<Regex> = OnceLock::new();
static KOREAN_REQ_RE: OnceLock<Regex> = OnceLock::new();

fn deadline_re() -> &'static Regex {
    DEADLINE_RE.get_or_init(|| Regex::new(r"^D-(\d+|day)$").expect("hardcoded regex"))
}

fn korean_req_re() -> &'static Regex {
    KOREAN_REQ_RE.get_or_init(|| {
        Regex::new(r"(?i)(?:korean|한국어|TOPIK)[^.;\n]*").expect("hardcoded regex")
    })
}

/// Saved session cookies with an expiry stamp.
#[derive(Debug, Deserialize)]
struct SessionFile {
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    cookies: BTreeMap<String, String>,
}

/// KOWORK adapter.
pub struct KoworkScraper {
    client: reqwest::Client,
    limiter: RateLimiter,
    list_url: String,
    max_pages: usize,
}

impl KoworkScraper {
    pub const SOURCE: Source = Source::Kowork;
    const LIST_URL: &'static str = "https://kowork.kr/en";

    const JOB_TYPES: [&'static str; 5] =
        ["Full Time", "Part Time", "Temporary", "Freelance", "Contract"];
    const CATEGORIES: [&'static str; 10] = [
        "IT",
        "Marketing/Ads",
        "Office/Administration",
        "Service",
        "Education",
        "Production/Manufacturing",
        "Interpretation/Translation",
        "Design",
        "Sales",
        "Etc",
    ];

    pub fn new(settings: &Settings) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&settings.scrape.user_agent)
            .timeout(settings.scrape.timeout());

        if let Some(cookie) = load_session_cookie(&settings.storage.data_dir) {
            let mut headers = HeaderMap::new();
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| AppError::session(format!("invalid cookie value: {e}")))?;
            headers.insert(COOKIE, value);
            builder = builder.default_headers(headers);
            log::info!("Session cookies applied");
        }

        Ok(Self {
            client: builder.build()?,
            limiter: RateLimiter::new(settings.scrape.rate_limit(Self::SOURCE)),
            list_url: settings
                .scrape
                .list_url_override(Self::SOURCE)
                .unwrap_or(Self::LIST_URL)
                .to_string(),
            max_pages: settings.scrape.max_pages,
        })
    }

    /// Extract light postings from one listing page.
    fn parse_list(html: &Html, base: &Url) -> Result<Vec<JobPosting>> {
        let card_sel = parse_selector(r#"a[href*="/en/post/"]"#)?;
        let p_sel = parse_selector("p")?;

        let mut postings = Vec::new();
        for card in html.select(&card_sel) {
            let Some(href) = card.value().attr("href") else {
                continue;
            };
            let url = crate::utils::resolve_url(base, href);
            if !url.contains("/en/post/") {
                continue;
            }

            let paragraphs: Vec<String> = card.select(&p_sel).map(|p| element_text(&p)).collect();
            let Some(title) = paragraphs.first().filter(|t| !t.is_empty()).cloned() else {
                continue;
            };

            let card_text = element_text(&card);
            let mut posting = JobPosting::new(Self::SOURCE, url, title);
            posting.e7_support = card_text.contains("E-7 Sponsors");
            posting.deadline = paragraphs
                .iter()
                .find(|t| deadline_re().is_match(t))
                .cloned();
            posting.location = paragraphs
                .iter()
                .find(|t| t.contains("-gu,") || t.contains("-si,") || t.contains("-do"))
                .cloned();
            posting.job_type = paragraphs
                .iter()
                .find(|t| Self::JOB_TYPES.contains(&t.as_str()))
                .cloned();
            posting.job_category = paragraphs
                .iter()
                .find(|t| Self::CATEGORIES.contains(&t.as_str()))
                .cloned();

            // Company is usually the paragraph right after the title
            posting.company_kor = paragraphs
                .iter()
                .skip(1)
                .find(|t| {
                    !t.is_empty()
                        && Some(t.as_str()) != posting.deadline.as_deref()
                        && Some(t.as_str()) != posting.location.as_deref()
                        && Some(t.as_str()) != posting.job_type.as_deref()
                        && Some(t.as_str()) != posting.job_category.as_deref()
                })
                .cloned();

            postings.push(posting);
        }
        Ok(postings)
    }

    /// Extract detail fields from one detail page.
    ///
    /// Returns `None` when no section content could be extracted.
    fn parse_detail(html: &Html) -> Result<Option<PostingDetail>> {
        let h2_sel = parse_selector("h2")?;
        let p_sel = parse_selector("p")?;
        let company_sel = parse_selector(r#"a[href*="/company/"]"#)?;

        let mut detail = PostingDetail::default();
        let mut sections: Vec<(&str, String)> = Vec::new();
        let mut korean_text = String::new();

        for h2 in html.select(&h2_sel) {
            let name = element_text(&h2);
            let Some(body) = next_sibling_element(&h2) else {
                continue;
            };

            match name.as_str() {
                "Job Description" => {
                    sections.push(("Job Description", truncate_chars(&element_text(&body), 3000)));
                }
                "Qualifications" | "Preferred" => {
                    let text = element_text(&body);
                    if korean_text.is_empty() {
                        if let Some(m) = korean_req_re().find(&text) {
                            korean_text = m.as_str().trim().to_string();
                        }
                    }
                    let label = if name == "Qualifications" {
                        "Qualifications"
                    } else {
                        "Preferred"
                    };
                    sections.push((label, truncate_chars(&text, 3000)));
                }
                "Etc" => {
                    sections.push(("Etc", truncate_chars(&element_text(&body), 2000)));
                }
                "Preferred Visas" => {
                    let visas: Vec<String> = body
                        .select(&p_sel)
                        .map(|p| element_text(&p))
                        .filter(|t| !t.is_empty())
                        .collect();
                    if !visas.is_empty() {
                        detail.visa = Some(visas.join(", "));
                    }
                }
                "Benefits" => {
                    let benefits: Vec<String> = body
                        .select(&p_sel)
                        .map(|p| element_text(&p))
                        .filter(|t| !t.is_empty())
                        .collect();
                    if benefits.iter().any(|b| {
                        let lower = b.to_lowercase();
                        lower.contains("e-7") || lower.contains("visa sponsorship")
                    }) {
                        detail.e7_support = true;
                    }
                    if !benefits.is_empty() {
                        let list = benefits
                            .iter()
                            .map(|b| format!("- {b}"))
                            .collect::<Vec<_>>()
                            .join("\n");
                        sections.push(("Benefits", list));
                    }
                }
                _ => {}
            }
        }

        detail.korean_requirement = KoreanLevel::from_source_text(&korean_text);

        if let Some(company) = html.select(&company_sel).next() {
            let name = element_text(&company);
            if !name.is_empty() {
                detail.company_kor = Some(name);
            }
        }

        // Sidebar renders label/value paragraph pairs
        let paragraphs: Vec<String> = html.select(&p_sel).map(|p| element_text(&p)).collect();
        for (i, text) in paragraphs.iter().enumerate() {
            let value = paragraphs.get(i + 1).filter(|v| !v.is_empty());
            match text.as_str() {
                "Job Type" => detail.job_type = value.cloned(),
                "Job Category" => detail.job_category = value.cloned(),
                "Location" => detail.location = value.cloned(),
                _ => {
                    if detail.deadline.is_none() && deadline_re().is_match(text) {
                        detail.deadline = Some(text.clone());
                    }
                }
            }
        }

        if sections.is_empty() {
            return Ok(None);
        }
        detail.content_raw = Some(
            sections
                .into_iter()
                .map(|(label, body)| format!("[{label}]\n{body}"))
                .collect::<Vec<_>>()
                .join("\n\n"),
        );
        Ok(Some(detail))
    }
}

#[async_trait]
impl JobScraper for KoworkScraper {
    fn source(&self) -> Source {
        Self::SOURCE
    }

    async fn scrape_list(&mut self) -> Result<Vec<JobPosting>> {
        let Self {
            client,
            limiter,
            list_url,
            max_pages,
        } = self;
        paginate_list(
            client,
            limiter,
            Self::SOURCE,
            list_url,
            *max_pages,
            Self::parse_list,
        )
        .await
    }

    async fn scrape_detail(&mut self, posting: &JobPosting) -> Result<Option<JobPosting>> {
        let html = http::fetch_html(&self.client, &mut self.limiter, &posting.url).await?;
        Ok(Self::parse_detail(&html)?.map(|detail| {
            let mut enriched = posting.clone();
            enriched.merge_detail(detail);
            enriched
        }))
    }
}

/// Load the session cookie header from the data directory.
///
/// Missing, malformed, or expired sessions degrade to unauthenticated
/// scraping of public data rather than failing the source.
fn load_session_cookie(data_dir: &Path) -> Option<String> {
    let path: PathBuf = data_dir.join(SESSION_FILE);
    if !path.exists() {
        log::warn!("Session file not found: {}", path.display());
        log::info!("Running in unauthenticated mode (public data only)");
        return None;
    }

    let session: SessionFile = match std::fs::read_to_string(&path)
        .map_err(AppError::from)
        .and_then(|text| serde_json::from_str(&text).map_err(AppError::from))
    {
        Ok(session) => session,
        Err(e) => {
            log::error!("Failed to load session: {e}");
            return None;
        }
    };

    let Some(expires_at) = session.expires_at else {
        log::warn!("Session has no expiration time");
        return None;
    };

    let remaining = (expires_at - Utc::now()).num_seconds();
    if remaining <= 0 {
        log::warn!("Session expired. Please re-login.");
        log::info!("Running in unauthenticated mode (public data only)");
        return None;
    }
    if remaining < SESSION_EXPIRY_WARN_SECS {
        log::warn!(
            "Session expiring soon: {:.1} minutes remaining",
            remaining as f64 / 60.0
        );
    } else {
        log::info!("Session valid: {:.1} minutes remaining", remaining as f64 / 60.0);
    }

    if session.cookies.is_empty() {
        return None;
    }
    Some(
        session
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    const LIST_HTML: &str = r#"
        <html><body>
          <a href="/en/post/101">
            <p>Backend Developer</p>
            <p>Hansung Foods</p>
            <p>IT</p>
            <p>Full Time</p>
            <p>Seongdong-gu, Seoul</p>
            <p>D-14</p>
            <span>E-7 Sponsors</span>
          </a>
          <a href="/en/post/101">
            <p>Backend Developer</p>
            <p>Hansung Foods</p>
          </a>
          <a href="/en/company/9"><p>Not a posting</p></a>
        </body></html>
    "#;

    const DETAIL_HTML: &str = r#"
        <html><body><main>
          <h1>Backend Developer</h1>
          <a href="/company/9">Hansung Foods Co.</a>
          <h2>Job Description</h2>
          <div>Build and operate the order system.</div>
          <h2>Qualifications</h2>
          <div>3+ years of experience. Korean: business level required.</div>
          <h2>Preferred Visas</h2>
          <div><p>E-7</p><p>F-2</p></div>
          <h2>Benefits</h2>
          <div><p>Visa sponsorship</p><p>Lunch provided</p></div>
          <p>Job Type</p><p>Full Time</p>
          <p>Location</p><p>Seongdong-gu, Seoul</p>
          <p>D-14</p>
        </main></body></html>
    "#;

    #[test]
    fn test_parse_list_extracts_card_fields() {
        let html = Html::parse_document(LIST_HTML);
        let base = Url::parse(KoworkScraper::LIST_URL).unwrap();
        let postings = KoworkScraper::parse_list(&html, &base).unwrap();

        // Duplicate card kept here; intra-run dedup happens downstream
        assert_eq!(postings.len(), 2);
        let p = &postings[0];
        assert_eq!(p.url, "https://kowork.kr/en/post/101");
        assert_eq!(p.title, "Backend Developer");
        assert_eq!(p.company_kor.as_deref(), Some("Hansung Foods"));
        assert_eq!(p.location.as_deref(), Some("Seongdong-gu, Seoul"));
        assert_eq!(p.job_type.as_deref(), Some("Full Time"));
        assert_eq!(p.job_category.as_deref(), Some("IT"));
        assert_eq!(p.deadline.as_deref(), Some("D-14"));
        assert!(p.e7_support);
        assert!(!p.is_deep());
    }

    #[test]
    fn test_parse_detail_sections_and_sidebar() {
        let html = Html::parse_document(DETAIL_HTML);
        let detail = KoworkScraper::parse_detail(&html).unwrap().unwrap();

        let content = detail.content_raw.as_deref().unwrap();
        assert!(content.contains("[Job Description]\nBuild and operate the order system."));
        assert!(content.contains("[Qualifications]"));
        assert!(content.contains("[Benefits]\n- Visa sponsorship"));

        assert_eq!(detail.visa.as_deref(), Some("E-7, F-2"));
        assert!(detail.e7_support);
        assert_eq!(detail.korean_requirement, Some(KoreanLevel::Business));
        assert_eq!(detail.company_kor.as_deref(), Some("Hansung Foods Co."));
        assert_eq!(detail.job_type.as_deref(), Some("Full Time"));
        assert_eq!(detail.location.as_deref(), Some("Seongdong-gu, Seoul"));
        assert_eq!(detail.deadline.as_deref(), Some("D-14"));
    }

    #[test]
    fn test_parse_detail_without_sections_is_absent() {
        let html = Html::parse_document("<html><body><p>Loading…</p></body></html>");
        assert!(KoworkScraper::parse_detail(&html).unwrap().is_none());
    }

    #[test]
    fn test_session_missing_file() {
        let tmp = TempDir::new().unwrap();
        assert!(load_session_cookie(tmp.path()).is_none());
    }

    #[test]
    fn test_session_expired() {
        let tmp = TempDir::new().unwrap();
        let expired = Utc::now() - Duration::hours(1);
        std::fs::write(
            tmp.path().join(SESSION_FILE),
            format!(
                r#"{{"expires_at": "{}", "cookies": {{"token": "abc"}}}}"#,
                expired.to_rfc3339()
            ),
        )
        .unwrap();
        assert!(load_session_cookie(tmp.path()).is_none());
    }

    #[test]
    fn test_session_valid_builds_cookie_header() {
        let tmp = TempDir::new().unwrap();
        let expires = Utc::now() + Duration::hours(1);
        std::fs::write(
            tmp.path().join(SESSION_FILE),
            format!(
                r#"{{"expires_at": "{}", "cookies": {{"a": "1", "b": "2"}}}}"#,
                expires.to_rfc3339()
            ),
        )
        .unwrap();
        assert_eq!(load_session_cookie(tmp.path()).as_deref(), Some("a=1; b=2"));
    }
}
