//! Klik (www.klik.co.kr) adapter.
//!
//! Multilingual job platform; no login required. Posting URLs follow
//! `/jobs/{alphanumeric_id}`. Detail pages carry structured list items
//! (region, salary, working hours, Korean level, visas) plus a duties
//! section.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::Html;
use url::Url;

use crate::config::Settings;
use crate::error::Result;
use crate::models::{JobPosting, KoreanLevel, PostingDetail, Source};
use crate::scrapers::{
    JobScraper, RateLimiter, element_lines, element_text, next_sibling_element, paginate_list,
    parse_selector, truncate_chars,
};
use crate::utils::http;

static JOB_PATH_RE: OnceLock<Regex> = OnceLock::new();
static DEADLINE_RE: OnceLock<Regex> = OnceLock::new();
static REGION_RE: OnceLock<Regex> = OnceLock::new();
static SALARY_RE: OnceLock<Regex> = OnceLock::new();
static WORK_TIME_RE: OnceLock<Regex> = OnceLock::new();
static CATEGORY_RE: OnceLock<Regex> = OnceLock::new();

fn job_path_re() -> &'static Regex {
    JOB_PATH_RE.get_or_init(|| Regex::new(r"/jobs/[A-Za-z0-9]+$").expect("hardcoded regex"))
}

fn deadline_re() -> &'static Regex {
    DEADLINE_RE.get_or_init(|| Regex::new(r"(?i)D-\d+|D-day").expect("hardcoded regex"))
}

fn region_re() -> &'static Regex {
    REGION_RE.get_or_init(|| {
        Regex::new(
            r"^(서울|경기|인천|부산|대구|광주|대전|울산|세종|강원|충북|충남|전북|전남|경북|경남|제주|재택)",
        )
        .expect("hardcoded regex")
    })
}

fn salary_re() -> &'static Regex {
    SALARY_RE.get_or_init(|| Regex::new(r"(시급|월급|연봉)\s*[\d,]+원").expect("hardcoded regex"))
}

fn work_time_re() -> &'static Regex {
    WORK_TIME_RE.get_or_init(|| Regex::new(r"\d{1,2}:\d{2}~\d{1,2}:\d{2}").expect("hardcoded regex"))
}

fn category_re() -> &'static Regex {
    CATEGORY_RE.get_or_init(|| {
        Regex::new(r"(식·음료|서비스|사무|제조|교육|IT|판매|기타)[^\n]*").expect("hardcoded regex")
    })
}

/// Klik adapter.
pub struct KlikScraper {
    client: reqwest::Client,
    limiter: RateLimiter,
    list_url: String,
    max_pages: usize,
}

impl KlikScraper {
    pub const SOURCE: Source = Source::Klik;
    const LIST_URL: &'static str = "https://www.klik.co.kr/jobs";

    const JOB_TYPES: [&'static str; 6] =
        ["정규직", "계약직", "프리랜서", "인턴", "파견직", "아르바이트"];
    const VISA_TOKENS: [&'static str; 9] =
        ["E-7", "F-2", "F-4", "F-5", "F-6", "D-10", "D-2", "C-4", "H-2"];

    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            client: http::create_client(&settings.scrape.user_agent, settings.scrape.timeout())?,
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
        let link_sel = parse_selector(r#"a[href*="/jobs/"]"#)?;

        let mut postings = Vec::new();
        for link in html.select(&link_sel) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if !job_path_re().is_match(href) {
                continue;
            }
            let url = crate::utils::resolve_url(base, href);

            let text = element_text(&link);
            let lines = element_lines(&link);

            let company = lines
                .first()
                .filter(|l| l.chars().count() < 50 && !l.starts_with("D-"))
                .cloned();
            let Some(title) = Self::find_title(&lines, company.as_deref()) else {
                continue;
            };

            let mut posting = JobPosting::new(Self::SOURCE, url, title);
            posting.company_kor = company;
            posting.deadline = deadline_re().find(&text).map(|m| m.as_str().to_string());
            posting.location = lines
                .iter()
                .find(|l| region_re().is_match(l))
                .map(|l| l.replace("cash", "").trim().to_string());
            posting.job_category = lines
                .iter()
                .find(|l| l.contains('·') && l.chars().count() < 50 && !region_re().is_match(l))
                .cloned();

            let types: Vec<&str> = Self::JOB_TYPES
                .iter()
                .filter(|jt| text.contains(**jt))
                .copied()
                .collect();
            if !types.is_empty() {
                posting.job_type = Some(types.join(", "));
            }

            postings.push(posting);
        }
        Ok(postings)
    }

    /// The title usually follows the deadline line; fall back to the
    /// longest line that matches nothing else.
    fn find_title(lines: &[String], company: Option<&str>) -> Option<String> {
        for (i, line) in lines.iter().enumerate() {
            if deadline_re().is_match(line) && line.starts_with("D-") {
                if let Some(next) = lines.get(i + 1) {
                    if next.chars().count() > 5
                        && !Self::JOB_TYPES.iter().any(|jt| next.starts_with(jt))
                        && !region_re().is_match(next)
                        && !next.starts_with("시급")
                        && !next.starts_with("월급")
                    {
                        return Some(next.clone());
                    }
                }
            }
        }

        lines
            .iter()
            .find(|line| {
                let count = line.chars().count();
                count > 10
                    && count < 150
                    && Some(line.as_str()) != company
                    && !line.starts_with("D-")
                    && !Self::JOB_TYPES.contains(&line.as_str())
                    && !region_re().is_match(line)
                    && !line.starts_with("시급")
                    && !line.starts_with("월급")
                    && !line.contains("저장하기")
            })
            .cloned()
    }

    /// Extract detail fields from one detail page.
    fn parse_detail(html: &Html) -> Result<Option<PostingDetail>> {
        let article_sel = parse_selector("article")?;
        let main_sel = parse_selector("main")?;
        let li_sel = parse_selector("li")?;
        let div_sel = parse_selector("div")?;
        let time_sel = parse_selector("time")?;

        let body = html
            .select(&article_sel)
            .next()
            .or_else(|| html.select(&main_sel).next());
        let body_text = body.map(|b| element_text(&b)).unwrap_or_default();
        if body_text.is_empty() {
            return Ok(None);
        }

        let mut detail = PostingDetail::default();

        if let Some(time) = html.select(&time_sel).next() {
            let text = element_text(&time);
            if !text.is_empty() {
                detail.deadline = Some(text);
            }
        }

        if let Some(m) = category_re().find(&body_text) {
            detail.job_category = Some(truncate_chars(m.as_str(), 50));
        }

        let types: Vec<&str> = Self::JOB_TYPES
            .iter()
            .filter(|jt| body_text.contains(**jt))
            .copied()
            .collect();
        if !types.is_empty() {
            detail.job_type = Some(types.join(", "));
        }

        let mut salary = None;
        let mut work_time = None;
        let mut work_days = None;
        let mut preferred = None;

        for li in html.select(&li_sel) {
            let text = element_text(&li);

            if detail.location.is_none() {
                if let Some(m) = region_re().find(&text) {
                    let from_region = &text[m.start()..];
                    detail.location = Some(truncate_chars(from_region.trim(), 80));
                }
            }
            if salary.is_none() {
                if let Some(m) = salary_re().find(&text) {
                    salary = Some(m.as_str().to_string());
                }
            }
            if work_days.is_none() && text.contains("요일") {
                let cleaned = text.replace("요일", "");
                let cleaned = cleaned.trim();
                if !cleaned.is_empty() {
                    work_days = Some(cleaned.to_string());
                }
            }
            if work_time.is_none() {
                if let Some(m) = work_time_re().find(&text) {
                    work_time = Some(m.as_str().to_string());
                }
            }

            if detail.korean_requirement.is_none()
                && (text.contains("한국어 능력") || text.contains("한국어능력"))
            {
                detail.korean_requirement = KoreanLevel::from_source_text(&text);
            }

            if detail.visa.is_none() && (text.contains("VISA") || text.contains("비자")) {
                let visas: Vec<&str> = Self::VISA_TOKENS
                    .iter()
                    .filter(|v| text.contains(**v))
                    .copied()
                    .collect();
                if !visas.is_empty() {
                    detail.visa = Some(visas.join(", "));
                } else if text.contains("확인필요") || text.contains("확인이 필요") {
                    detail.visa = Some("확인필요".to_string());
                }
            }

            if preferred.is_none() && (text.contains("우대조건") || text.contains("우대 조건"))
            {
                let cleaned = text.replace("우대조건", "").replace("우대 조건", "");
                let cleaned = cleaned.trim();
                if !cleaned.is_empty() {
                    preferred = Some(cleaned.to_string());
                }
            }
        }

        let mut duties = None;
        for div in html.select(&div_sel) {
            let label = element_text(&div);
            if label == "담당업무" || label == "담당 업무" {
                if let Some(next) = next_sibling_element(&div) {
                    let text = element_text(&next);
                    let count = text.chars().count();
                    if count > 10 && count < 3000 {
                        duties = Some(text);
                        break;
                    }
                }
            }
        }

        detail.e7_support = body_text.contains("E-7")
            && (body_text.contains("지원") || body_text.to_lowercase().contains("sponsor"));

        let mut sections: Vec<String> = Vec::new();
        if let Some(d) = &duties {
            sections.push(format!("[담당업무]\n{d}"));
        }
        if let Some(s) = &salary {
            sections.push(format!("[급여] {s}"));
        }
        if let Some(t) = &work_time {
            sections.push(format!("[근무시간] {t}"));
        }
        if let Some(d) = &work_days {
            sections.push(format!("[근무요일] {d}"));
        }
        if let Some(p) = &preferred {
            sections.push(format!("[우대조건] {p}"));
        }

        detail.content_raw = if !sections.is_empty() {
            Some(sections.join("\n\n"))
        } else {
            Some(truncate_chars(&body_text, 8000))
        };
        Ok(Some(detail))
    }
}

#[async_trait]
impl JobScraper for KlikScraper {
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
