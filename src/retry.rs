// SPDX-License-Identifier: MIT

//! Retry policy with exponential backoff for PowerDNS API calls.
//!
//! Transient failures (connection errors, timeouts, HTTP 429/5xx) are
//! retried a bounded number of times with exponentially growing delays and
//! random jitter; permanent errors (other 4xx) fail fast.

use rand::Rng;
use reqwest::StatusCode;
use std::time::Duration;

/// Default number of additional attempts after the first failure.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default base backoff before the first retry (500ms).
pub const DEFAULT_BACKOFF_MS: u64 = 500;

/// Default backoff ceiling (5 seconds).
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 5_000;

/// Default maximum random jitter added to each delay (100ms).
pub const DEFAULT_JITTER_MS: u64 = 100;

/// Retry configuration for one API connection.
///
/// The delay before retry attempt `k` (1-indexed) is
/// `min(max_backoff, backoff * 2^(k-1))` plus a uniform random jitter in
/// `[0, jitter]`. Doubling with a ceiling keeps a burst of failing zones
/// from hammering a recovering server, the jitter spreads them out.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the initial one.
    pub retries: u32,

    /// Base delay before the first retry.
    pub backoff: Duration,

    /// Upper bound on the exponential delay (jitter excluded).
    pub max_backoff: Duration,

    /// Maximum random jitter added to every delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            jitter: Duration::from_millis(DEFAULT_JITTER_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep before retry attempt `attempt` (1-indexed).
    ///
    /// # Arguments
    ///
    /// * `attempt` - The retry attempt about to be made, starting at 1.
    /// * `retry_after` - Value of a `Retry-After` response header, if the
    ///   server sent one; the computed delay is raised to at least this.
    #[must_use]
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let scaled = self
            .backoff
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_backoff);
        let mut delay = scaled + self.random_jitter();
        if let Some(server_floor) = retry_after {
            delay = delay.max(server_floor);
        }
        delay
    }

    fn random_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        Duration::from_secs_f64(rng.gen_range(0.0..=self.jitter.as_secs_f64()))
    }
}

/// Determine if an HTTP status code is retryable.
///
/// # Retryable Status Codes
///
/// - **429** (Too Many Requests) - Rate limiting
/// - **500** (Internal Server Error) - Server error
/// - **502** (Bad Gateway) - Proxy/gateway error
/// - **503** (Service Unavailable) - Temporary unavailability
/// - **504** (Gateway Timeout) - Gateway timeout
///
/// Every other 4xx is a permanent client error and fails immediately.
#[must_use]
pub fn is_retryable_http_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Parse a `Retry-After` header value into a duration.
///
/// Only the delta-seconds form is honoured; HTTP-date values are ignored.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
