// src/utils/http.rs

//! HTTP client utilities.
//!
//! All page fetches go through [`fetch_text`]/[`fetch_html`], which
//! block on the source's rate limiter before dispatch and retry
//! transient failures under its backoff policy.

use std::time::Duration;

use scraper::Html;

use crate::error::{AppError, Result};
use crate::scrapers::RateLimiter;

/// Create a configured asynchronous HTTP client.
pub fn create_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Classify a request failure as transient (worth retrying).
pub fn is_transient(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_connect() {
        return true;
    }
    err.status()
        .is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
}

/// Fetch a page body through the rate limiter.
///
/// Transient failures are retried with escalating backoff until the
/// limiter's per-item budget runs out; any other failure aborts
/// immediately.
pub async fn fetch_text(
    client: &reqwest::Client,
    limiter: &mut RateLimiter,
    url: &str,
) -> Result<String> {
    loop {
        limiter.acquire().await;

        let outcome = match client.get(url).send().await {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => resp.text().await,
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };

        match outcome {
            Ok(text) => {
                limiter.record_success();
                return Ok(text);
            }
            Err(err) if is_transient(&err) => {
                log::warn!("Transient fetch failure for {url}: {err}");
                if !limiter.record_failure() {
                    return Err(AppError::RetriesExhausted {
                        url: url.to_string(),
                        attempts: limiter.consecutive_failures(),
                        message: err.to_string(),
                    });
                }
            }
            Err(err) => return Err(AppError::Http(err)),
        }
    }
}

/// Fetch a page through the rate limiter and parse it as HTML.
pub async fn fetch_html(
    client: &reqwest::Client,
    limiter: &mut RateLimiter,
    url: &str,
) -> Result<Html> {
    let text = fetch_text(client, limiter, url).await?;
    Ok(Html::parse_document(&text))
}
