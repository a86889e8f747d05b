//! Job posting data structures.
//!
//! The posting URL is the primary key across every source and storage
//! backend; it is assigned once by the adapter and never mutated.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Listing site a posting was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Kowork,
    Komate,
    Klik,
}

impl Source {
    /// All known sources, in default run order.
    pub const ALL: [Source; 3] = [Source::Kowork, Source::Komate, Source::Klik];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Kowork => "kowork",
            Source::Komate => "komate",
            Source::Klik => "klik",
        }
    }

    /// Storage partition (sheet/table) name for this source.
    pub fn partition(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kowork" => Ok(Source::Kowork),
            "komate" => Ok(Source::Komate),
            "klik" => Ok(Source::Klik),
            other => Err(AppError::config(format!("Unknown site: {other}"))),
        }
    }
}

/// Korean language requirement, normalized onto a fixed ordinal scale.
///
/// Adapters map raw source text (Korean or English phrasing) onto this
/// scale; text that matches nothing yields no requirement at all rather
/// than a raw passthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KoreanLevel {
    NotRequired,
    Basic,
    Intermediate,
    Business,
    Native,
}

impl KoreanLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            KoreanLevel::NotRequired => "not_required",
            KoreanLevel::Basic => "basic",
            KoreanLevel::Intermediate => "intermediate",
            KoreanLevel::Business => "business",
            KoreanLevel::Native => "native",
        }
    }

    /// Human-readable label used in summaries.
    pub fn label(&self) -> &'static str {
        match self {
            KoreanLevel::NotRequired => "Not required",
            KoreanLevel::Basic => "Basic level",
            KoreanLevel::Intermediate => "Intermediate (everyday conversation)",
            KoreanLevel::Business => "Business level",
            KoreanLevel::Native => "Native level",
        }
    }

    /// Map raw source text onto the scale.
    ///
    /// Phrases cover the wording used by all three sites, e.g. Komate's
    /// "비즈니스 회화 가능", Klik's single-word grades ("고급"), and
    /// KOWORK's English terms. Checked from the most to the least
    /// specific so "원어민 수준 대화 가능" does not match on "대화".
    pub fn from_source_text(raw: &str) -> Option<KoreanLevel> {
        let text = raw.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }

        const PHRASES: [(&str, KoreanLevel); 16] = [
            ("원어민", KoreanLevel::Native),
            ("native", KoreanLevel::Native),
            ("비즈니스", KoreanLevel::Business),
            ("비지니스", KoreanLevel::Business),
            ("business", KoreanLevel::Business),
            ("고급", KoreanLevel::Business),
            ("advanced", KoreanLevel::Business),
            ("일상 대화", KoreanLevel::Intermediate),
            ("일상대화", KoreanLevel::Intermediate),
            ("중급", KoreanLevel::Intermediate),
            ("intermediate", KoreanLevel::Intermediate),
            ("기초", KoreanLevel::Basic),
            ("초급", KoreanLevel::Basic),
            ("basic", KoreanLevel::Basic),
            ("무관", KoreanLevel::NotRequired),
            ("not required", KoreanLevel::NotRequired),
        ];

        PHRASES
            .iter()
            .find(|(phrase, _)| text.contains(phrase))
            .map(|(_, level)| *level)
    }
}

/// A job posting collected from a listing site.
///
/// A posting is *light* while `content_raw` is absent and *deep* once
/// detail scraping has populated it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    /// Canonical posting URL (primary key)
    pub url: String,

    /// Posting title
    pub title: String,

    /// Korean company name
    #[serde(default)]
    pub company_kor: Option<String>,

    /// English company name
    #[serde(default)]
    pub company_eng: Option<String>,

    /// Work location (city/district)
    #[serde(default)]
    pub location: Option<String>,

    /// Eligible visa types, comma-separated free text
    #[serde(default)]
    pub visa: Option<String>,

    /// Whether the employer sponsors an E-7 visa
    #[serde(default)]
    pub e7_support: bool,

    /// Normalized Korean language requirement
    #[serde(default)]
    pub korean_requirement: Option<KoreanLevel>,

    /// Job category
    #[serde(default)]
    pub job_category: Option<String>,

    /// Employment type
    #[serde(default)]
    pub job_type: Option<String>,

    /// Application deadline ("D-14" or a date)
    #[serde(default)]
    pub deadline: Option<String>,

    /// Full detail-page text; present only after deep scraping
    #[serde(default)]
    pub content_raw: Option<String>,

    /// When the record was finalized
    pub scraped_at: DateTime<Utc>,

    /// Site the posting came from
    pub source: Source,
}

/// Column order shared by the tabular and spreadsheet backends.
///
/// This order is a compatibility contract; changing it breaks existing
/// files and sheets.
pub const COLUMNS: [&str; 14] = [
    "url",
    "title",
    "company_kor",
    "company_eng",
    "location",
    "visa",
    "e7_support",
    "korean_requirement",
    "job_category",
    "job_type",
    "deadline",
    "content_raw",
    "scraped_at",
    "source",
];

impl JobPosting {
    /// Create a light posting with only identity fields set.
    pub fn new(source: Source, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            company_kor: None,
            company_eng: None,
            location: None,
            visa: None,
            e7_support: false,
            korean_requirement: None,
            job_category: None,
            job_type: None,
            deadline: None,
            content_raw: None,
            scraped_at: Utc::now(),
            source,
        }
    }

    /// Whether detail scraping has populated this record.
    pub fn is_deep(&self) -> bool {
        self.content_raw.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Merge detail-page fields into this posting.
    ///
    /// Values already present win; `e7_support` is additive; identity
    /// (`url`, `source`) is never touched. `scraped_at` is refreshed to
    /// the moment the record was finalized.
    pub fn merge_detail(&mut self, detail: PostingDetail) {
        fill_missing(&mut self.company_kor, detail.company_kor);
        fill_missing(&mut self.company_eng, detail.company_eng);
        fill_missing(&mut self.location, detail.location);
        fill_missing(&mut self.visa, detail.visa);
        fill_missing(&mut self.job_category, detail.job_category);
        fill_missing(&mut self.job_type, detail.job_type);
        fill_missing(&mut self.deadline, detail.deadline);

        if detail.e7_support {
            self.e7_support = true;
        }
        if self.korean_requirement.is_none() {
            self.korean_requirement = detail.korean_requirement;
        }
        if detail
            .content_raw
            .as_deref()
            .is_some_and(|c| !c.is_empty())
        {
            self.content_raw = detail.content_raw;
        }

        self.scraped_at = Utc::now();
    }

    /// Render the posting as one tabular row in contract column order.
    ///
    /// Missing optionals render as empty cells and `e7_support` renders
    /// `Y`/`N` for spreadsheet compatibility.
    pub fn to_row(&self) -> Vec<String> {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        vec![
            self.url.clone(),
            self.title.clone(),
            opt(&self.company_kor),
            opt(&self.company_eng),
            opt(&self.location),
            opt(&self.visa),
            if self.e7_support { "Y" } else { "N" }.to_string(),
            self.korean_requirement
                .map(|l| l.as_str().to_string())
                .unwrap_or_default(),
            opt(&self.job_category),
            opt(&self.job_type),
            opt(&self.deadline),
            opt(&self.content_raw),
            self.scraped_at.to_rfc3339(),
            self.source.to_string(),
        ]
    }
}

/// Fields extracted from a detail page, merged into a light posting.
#[derive(Debug, Clone, Default)]
pub struct PostingDetail {
    pub company_kor: Option<String>,
    pub company_eng: Option<String>,
    pub location: Option<String>,
    pub visa: Option<String>,
    pub e7_support: bool,
    pub korean_requirement: Option<KoreanLevel>,
    pub job_category: Option<String>,
    pub job_type: Option<String>,
    pub deadline: Option<String>,
    pub content_raw: Option<String>,
}

fn fill_missing(dst: &mut Option<String>, src: Option<String>) {
    let present = dst.as_deref().is_some_and(|v| !v.trim().is_empty());
    if !present {
        if let Some(value) = src.filter(|v| !v.trim().is_empty()) {
            *dst = Some(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_posting() -> JobPosting {
        let mut posting = JobPosting::new(
            Source::Komate,
            "https://komate.saramin.co.kr/recruits/1234",
            "Backend Engineer",
        );
        posting.company_kor = Some("테스트회사".to_string());
        posting
    }

    #[test]
    fn test_source_round_trip() {
        for source in Source::ALL {
            assert_eq!(source.as_str().parse::<Source>().unwrap(), source);
        }
        assert!("linkedin".parse::<Source>().is_err());
    }

    #[test]
    fn test_korean_level_from_korean_phrases() {
        assert_eq!(
            KoreanLevel::from_source_text("원어민 수준 대화 가능"),
            Some(KoreanLevel::Native)
        );
        assert_eq!(
            KoreanLevel::from_source_text("비즈니스 회화 가능"),
            Some(KoreanLevel::Business)
        );
        assert_eq!(
            KoreanLevel::from_source_text("일상 대화 가능"),
            Some(KoreanLevel::Intermediate)
        );
        assert_eq!(
            KoreanLevel::from_source_text("기초 회화 가능"),
            Some(KoreanLevel::Basic)
        );
        assert_eq!(
            KoreanLevel::from_source_text("무관"),
            Some(KoreanLevel::NotRequired)
        );
    }

    #[test]
    fn test_korean_level_from_english_phrases() {
        assert_eq!(
            KoreanLevel::from_source_text("Korean: business level required"),
            Some(KoreanLevel::Business)
        );
        assert_eq!(
            KoreanLevel::from_source_text("Not required"),
            Some(KoreanLevel::NotRequired)
        );
    }

    #[test]
    fn test_korean_level_unknown_text_is_none() {
        assert_eq!(KoreanLevel::from_source_text("TOPIK preferred"), None);
        assert_eq!(KoreanLevel::from_source_text(""), None);
    }

    #[test]
    fn test_korean_level_is_ordinal() {
        assert!(KoreanLevel::NotRequired < KoreanLevel::Basic);
        assert!(KoreanLevel::Intermediate < KoreanLevel::Business);
        assert!(KoreanLevel::Business < KoreanLevel::Native);
    }

    #[test]
    fn test_merge_detail_fills_gaps_only() {
        let mut posting = sample_posting();
        posting.location = Some("서울 강남구".to_string());

        posting.merge_detail(PostingDetail {
            company_kor: Some("다른회사".to_string()),
            location: Some("부산".to_string()),
            visa: Some("E-7, F-2".to_string()),
            e7_support: true,
            korean_requirement: Some(KoreanLevel::Intermediate),
            content_raw: Some("[담당 업무]\n서버 개발".to_string()),
            ..PostingDetail::default()
        });

        // Present values kept, gaps filled
        assert_eq!(posting.company_kor.as_deref(), Some("테스트회사"));
        assert_eq!(posting.location.as_deref(), Some("서울 강남구"));
        assert_eq!(posting.visa.as_deref(), Some("E-7, F-2"));
        assert!(posting.e7_support);
        assert_eq!(posting.korean_requirement, Some(KoreanLevel::Intermediate));
        assert!(posting.is_deep());
    }

    #[test]
    fn test_merge_detail_keeps_identity() {
        let mut posting = sample_posting();
        let url = posting.url.clone();
        posting.merge_detail(PostingDetail::default());
        assert_eq!(posting.url, url);
        assert_eq!(posting.source, Source::Komate);
        assert!(!posting.is_deep());
    }

    #[test]
    fn test_merge_detail_does_not_clear_e7() {
        let mut posting = sample_posting();
        posting.e7_support = true;
        posting.merge_detail(PostingDetail::default());
        assert!(posting.e7_support);
    }

    #[test]
    fn test_to_row_matches_column_order() {
        let mut posting = sample_posting();
        posting.e7_support = true;
        posting.korean_requirement = Some(KoreanLevel::Basic);

        let row = posting.to_row();
        assert_eq!(row.len(), COLUMNS.len());
        assert_eq!(row[0], posting.url);
        assert_eq!(row[1], "Backend Engineer");
        assert_eq!(row[2], "테스트회사");
        assert_eq!(row[6], "Y");
        assert_eq!(row[7], "basic");
        assert_eq!(row[13], "komate");
    }
}
