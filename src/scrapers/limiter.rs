//! Per-source rate limiting and backoff policy.
//!
//! Every outbound request for one source passes through one limiter
//! instance. The limiter enforces a minimum interval between requests
//! and escalates that interval after consecutive transient failures,
//! so a struggling site is probed progressively more gently until it
//! answers again.

use std::time::Duration;

use tokio::time::Instant;

/// Rate-limit policy for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Minimum interval between requests
    pub base_delay: Duration,
    /// Backoff ceiling
    pub max_delay: Duration,
    /// Attempts per item before giving up on it
    pub max_attempts: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1500),
            max_delay: Duration::from_secs(24),
            max_attempts: 3,
        }
    }
}

/// Stateful limiter for one source.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    last_request: Option<Instant>,
    current_delay: Duration,
    consecutive_failures: u32,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let current_delay = config.base_delay;
        Self {
            config,
            last_request: None,
            current_delay,
            consecutive_failures: 0,
        }
    }

    /// Block until the current minimum interval since the previous
    /// request has elapsed, then claim the request slot.
    pub async fn acquire(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.current_delay {
                tokio::time::sleep(self.current_delay - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    /// Reset backoff after a successful request.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay = self.config.base_delay;
    }

    /// Escalate backoff after a transient failure.
    ///
    /// Returns `false` once the retry budget for the current item is
    /// spent; the caller must stop retrying that item.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        self.current_delay = (self.current_delay * 2).min(self.config.max_delay);
        self.consecutive_failures < self.config.max_attempts
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
