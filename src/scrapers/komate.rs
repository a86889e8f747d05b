//! Komate (komate.saramin.co.kr) adapter.
//!
//! Saramin-operated job board for foreign workers. Korean-language
//! surface only; no login required. Listing cards are line-oriented
//! (company, deadline, title, region) and expose the Korean-level
//! requirement and the E-7 badge directly in the list.

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

static RECRUIT_ID_RE: OnceLock<Regex> = OnceLock::new();
static DEADLINE_RE: OnceLock<Regex> = OnceLock::new();
static DEADLINE_LINE_RE: OnceLock<Regex> = OnceLock::new();
static REGION_RE: OnceLock<Regex> = OnceLock::new();
static VISA_CODE_RE: OnceLock<Regex> = OnceLock::new();

fn recruit_id_re() -> &'static Regex {
    RECRUIT_ID_RE.get_or_init(|| Regex::new(r"/recruits/(\d+)").expect("hardcoded regex"))
}

fn deadline_re() -> &'static Regex {
    DEADLINE_RE.get_or_init(|| Regex::new(r"(?i)D-\d+|D-day|상시\s*채용").expect("hardcoded regex"))
}

fn deadline_line_re() -> &'static Regex {
    DEADLINE_LINE_RE
        .get_or_init(|| Regex::new(r"(?i)^(D-\d+|D-day|상시\s*채용)$").expect("hardcoded regex"))
}

fn region_re() -> &'static Regex {
    REGION_RE.get_or_init(|| {
        Regex::new(
            r"^(서울|경기|인천|부산|대구|광주|대전|울산|세종|강원|충북|충남|전북|전남|경북|경남|제주)\s",
        )
        .expect("hardcoded regex")
    })
}

fn visa_code_re() -> &'static Regex {
    VISA_CODE_RE.get_or_init(|| Regex::new(r"^([A-Z]-\d+)").expect("hardcoded regex"))
}

/// Komate adapter.
pub struct KomateScraper {
    client: reqwest::Client,
    limiter: RateLimiter,
    list_url: String,
    max_pages: usize,
}

impl KomateScraper {
    pub const SOURCE: Source = Source::Komate;
    const LIST_URL: &'static str = "https://komate.saramin.co.kr/recruits/list";

    const JOB_TYPES: [&'static str; 6] =
        ["정규직", "계약직", "프리랜서", "인턴", "파견직", "위촉직"];
    const VISA_TOKENS: [&'static str; 8] =
        ["E-7", "F-2", "F-4", "F-5", "F-6", "D-10", "C-4", "H-2"];

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
        let card_sel = parse_selector(r#"a[href*="/recruits/"]"#)?;
        let origin = base.origin().ascii_serialization();

        let mut postings = Vec::new();
        for card in html.select(&card_sel) {
            let Some(href) = card.value().attr("href") else {
                continue;
            };
            if href.contains("resume") {
                continue;
            }
            // Canonical URL: strip query parameters down to the numeric id
            let Some(caps) = recruit_id_re().captures(href) else {
                continue;
            };
            let url = format!("{origin}/recruits/{}", &caps[1]);

            let text = element_text(&card);
            let lines = element_lines(&card);

            let company = lines.first().cloned();
            let deadline = deadline_re().find(&text).map(|m| m.as_str().to_string());
            let title = Self::find_title(&lines);
            let Some(title) = title else {
                continue;
            };

            let mut posting = JobPosting::new(Self::SOURCE, url, title);
            posting.company_kor = company;
            posting.deadline = deadline;
            posting.e7_support =
                text.contains("E-7 비자지원") || text.contains("E-7 비자 지원");
            posting.korean_requirement = KoreanLevel::from_source_text(&text);
            posting.job_type = Self::JOB_TYPES
                .iter()
                .find(|jt| text.contains(*jt))
                .map(|jt| (*jt).to_string());
            posting.location = lines.iter().find(|l| region_re().is_match(l)).cloned();
            posting.job_category = lines
                .iter()
                .find(|l| l.contains('·') && l.chars().count() < 80 && !region_re().is_match(l))
                .cloned();

            let visas: Vec<&str> = Self::VISA_TOKENS
                .iter()
                .filter(|v| text.contains(**v))
                .copied()
                .collect();
            if !visas.is_empty() {
                posting.visa = Some(visas.join(", "));
            }

            postings.push(posting);
        }
        Ok(postings)
    }

    /// The title usually follows the deadline line; fall back to the
    /// longest line that matches nothing else.
    fn find_title(lines: &[String]) -> Option<String> {
        for (i, line) in lines.iter().enumerate() {
            if deadline_line_re().is_match(line) {
                if let Some(next) = lines.get(i + 1) {
                    if next.chars().count() > 10
                        && !Self::JOB_TYPES.iter().any(|jt| next.starts_with(jt))
                        && !next.starts_with("E-7")
                    {
                        return Some(next.clone());
                    }
                }
            }
        }

        lines
            .iter()
            .skip(1)
            .find(|line| {
                line.chars().count() > 15
                    && !deadline_line_re().is_match(line)
                    && !Self::JOB_TYPES.contains(&line.as_str())
                    && KoreanLevel::from_source_text(line).is_none()
                    && !region_re().is_match(line)
                    && !line.contains('·')
            })
            .cloned()
    }

    /// Extract detail fields from one detail page.
    fn parse_detail(html: &Html) -> Result<Option<PostingDetail>> {
        let div_sel = parse_selector("div")?;
        let span_sel = parse_selector("span")?;
        let company_sel = parse_selector(r#"a[href*="company-info"] div"#)?;
        let main_sel = parse_selector("main")?;

        let mut detail = PostingDetail::default();
        let body_text = html
            .select(&main_sel)
            .next()
            .map(|m| element_text(&m))
            .unwrap_or_default();

        if let Some(company) = html.select(&company_sel).next() {
            let name = element_text(&company);
            if !name.is_empty() {
                detail.company_kor = Some(name);
            }
        }

        detail.deadline = deadline_re().find(&body_text).map(|m| m.as_str().to_string());
        detail.e7_support =
            body_text.contains("E-7 비자지원") || body_text.contains("E-7 비자 지원");

        let mut duties = None;
        let mut preferred = None;
        let mut benefits = None;
        let mut career = None;
        let mut education = None;

        for div in html.select(&div_sel) {
            let label = element_text(&div);
            let Some(body) = next_sibling_element(&div) else {
                continue;
            };
            let value = element_text(&body);
            if value.is_empty() {
                continue;
            }

            match label.as_str() {
                "담당 업무" => duties = Some(truncate_chars(&value, 3000)),
                "우대 조건" => preferred = Some(truncate_chars(&value, 1000)),
                "복지 및 혜택" => benefits = Some(truncate_chars(&value, 1000)),
                "근무지" => {
                    let cleaned = value.replace("지도", "").replace("복사", "");
                    let cleaned = cleaned.trim();
                    if !cleaned.is_empty() {
                        detail.location = Some(cleaned.to_string());
                    }
                }
                "경력" if value.chars().count() < 50 => career = Some(value),
                "학력" if value.chars().count() < 50 => education = Some(value),
                "한국어 수준" if value.chars().count() < 50 => {
                    detail.korean_requirement = KoreanLevel::from_source_text(&value);
                }
                "지원 가능한 비자" => {
                    let mut visas: Vec<String> = Vec::new();
                    for span in body.select(&span_sel) {
                        let text = element_text(&span);
                        if let Some(caps) = visa_code_re().captures(&text) {
                            let code = caps[1].to_string();
                            if !visas.contains(&code) {
                                visas.push(code);
                            }
                        }
                    }
                    if !visas.is_empty() {
                        detail.visa = Some(visas.join(", "));
                    }
                }
                _ => {}
            }
        }

        let mut sections: Vec<String> = Vec::new();
        if let Some(d) = duties {
            sections.push(format!("[담당 업무]\n{d}"));
        }
        if let Some(p) = preferred {
            sections.push(format!("[우대 조건]\n{p}"));
        }
        if let Some(b) = benefits {
            sections.push(format!("[복지 및 혜택]\n{b}"));
        }
        if let Some(c) = career {
            sections.push(format!("[경력] {c}"));
        }
        if let Some(e) = education {
            sections.push(format!("[학력] {e}"));
        }

        if !sections.is_empty() {
            detail.content_raw = Some(sections.join("\n\n"));
        } else if !body_text.is_empty() {
            detail.content_raw = Some(truncate_chars(&body_text, 8000));
        } else {
            return Ok(None);
        }
        Ok(Some(detail))
    }
}

#[async_trait]
impl JobScraper for KomateScraper {
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
