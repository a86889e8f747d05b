//! Site adapters.
//!
//! One adapter per listing site, all behind the [`JobScraper`] trait so
//! the orchestrator never touches markup structure or site navigation.
//! Each adapter owns its HTTP session and a per-source rate limiter for
//! the duration of one pipeline pass; dropping the adapter releases the
//! session on every exit path.

mod klik;
mod komate;
mod kowork;
mod limiter;

use std::collections::HashSet;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::models::{JobPosting, Source};
use crate::utils::http;

pub use klik::KlikScraper;
pub use komate::KomateScraper;
pub use kowork::KoworkScraper;
pub use limiter::{RateLimitConfig, RateLimiter};

/// Trait for site adapters.
#[async_trait]
pub trait JobScraper: Send {
    /// Source this adapter scrapes.
    fn source(&self) -> Source;

    /// Fetch the listing surface until exhaustion, producing one light
    /// posting per distinct listing entry.
    async fn scrape_list(&mut self) -> Result<Vec<JobPosting>>;

    /// Fetch and extract the detail page for one posting, merging the
    /// extracted fields into a copy of it.
    ///
    /// Returns `Ok(None)` when the page was fetched but no content
    /// could be extracted; the caller keeps the light record.
    async fn scrape_detail(&mut self, posting: &JobPosting) -> Result<Option<JobPosting>>;
}

/// Build the adapter for a source.
pub fn build_scraper(source: Source, settings: &Settings) -> Result<Box<dyn JobScraper>> {
    Ok(match source {
        Source::Kowork => Box::new(KoworkScraper::new(settings)?),
        Source::Komate => Box::new(KomateScraper::new(settings)?),
        Source::Klik => Box::new(KlikScraper::new(settings)?),
    })
}

/// Fetch listing pages `?page=N` until no page yields anything new.
///
/// A retries-exhausted failure on the first page fails the source; on a
/// later page it ends pagination with what was collected so far.
pub(crate) async fn paginate_list(
    client: &reqwest::Client,
    limiter: &mut RateLimiter,
    source: Source,
    list_url: &str,
    max_pages: usize,
    parse: fn(&Html, &Url) -> Result<Vec<JobPosting>>,
) -> Result<Vec<JobPosting>> {
    let mut postings: Vec<JobPosting> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let base = Url::parse(list_url)?;

    for page in 1..=max_pages {
        let url = if page == 1 {
            list_url.to_string()
        } else {
            format!("{list_url}?page={page}")
        };

        let html = match http::fetch_html(client, limiter, &url).await {
            Ok(html) => html,
            Err(err @ AppError::RetriesExhausted { .. }) if page > 1 => {
                log::warn!(
                    "Giving up on {source} listing page {page} ({err}); keeping {} postings",
                    postings.len()
                );
                break;
            }
            Err(err) => return Err(err),
        };

        let mut new_on_page = 0;
        for posting in parse(&html, &base)? {
            if seen.insert(posting.url.clone()) {
                postings.push(posting);
                new_on_page += 1;
            }
        }

        log::debug!("{source} listing page {page}: {new_on_page} new postings");
        if new_on_page == 0 {
            break;
        }
    }

    Ok(postings)
}

/// Parse a CSS selector, mapping failures into `AppError`.
pub(crate) fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Whitespace-normalized text content of an element.
pub(crate) fn element_text(el: &ElementRef) -> String {
    crate::utils::normalize_whitespace(&el.text().collect::<String>())
}

/// Text lines of an element, one per non-empty text node.
pub(crate) fn element_lines(el: &ElementRef) -> Vec<String> {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Next sibling that is an element, skipping text/comment nodes.
pub(crate) fn next_sibling_element<'a>(el: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    let mut node = el.next_sibling();
    while let Some(n) = node {
        if let Some(element) = ElementRef::wrap(n) {
            return Some(element);
        }
        node = n.next_sibling();
    }
    None
}

/// Truncate to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selector_valid() {
        assert!(parse_selector("div.card").is_ok());
        assert!(parse_selector(r#"a[href*="/jobs/"]"#).is_ok());
    }

    #[test]
    fn test_parse_selector_invalid() {
        assert!(parse_selector("[[invalid").is_err());
    }

    #[test]
    fn test_next_sibling_element_skips_text_nodes() {
        let html = Html::parse_fragment("<div><h2>Head</h2> some text <p>Body</p></div>");
        let h2_sel = parse_selector("h2").unwrap();
        let h2 = html.select(&h2_sel).next().unwrap();

        let sibling = next_sibling_element(&h2).unwrap();
        assert_eq!(sibling.value().name(), "p");
        assert_eq!(element_text(&sibling), "Body");
    }

    #[test]
    fn test_element_lines() {
        let html = Html::parse_fragment("<a><p> Acme </p><p>D-7</p><span>서울 강남구</span></a>");
        let a_sel = parse_selector("a").unwrap();
        let a = html.select(&a_sel).next().unwrap();
        assert_eq!(element_lines(&a), vec!["Acme", "D-7", "서울 강남구"]);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("한국어능력", 3), "한국어");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
