//! Bounded retry loop for remote calls.
//!
//! # Policy
//! - HTTP 429: wait for `Retry-After` (or the default), capped at
//!   `max_delay_ms`, and retry. These waits do not advance the exponential
//!   backoff counter, but are bounded by their own budget.
//! - Any other failure: wait `base * 2^attempt` and retry until
//!   `max_retries` attempts have failed.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::config::RemoteConfig;
use crate::resilience::backoff::calculate_backoff;

/// Why the last attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureCause {
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result of a single attempt, as seen by the retry loop.
#[derive(Debug)]
pub enum Attempt<T> {
    /// Done; stop retrying.
    Success(T),
    /// Upstream asked us to slow down (HTTP 429).
    Throttled { retry_after: Option<Duration> },
    /// Retryable failure.
    Failed(FailureCause),
}

/// All attempts were used up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("gave up after {attempts} attempts, last failure: {last}")]
pub struct RetriesExhausted {
    pub attempts: u32,
    pub last: FailureCause,
}

/// Retry tuning, derived from [`RemoteConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub max_rate_limited_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub default_retry_after: Duration,
    pub jitter_percent: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RemoteConfig::default())
    }
}

impl From<&RemoteConfig> for RetryPolicy {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            max_rate_limited_retries: config.max_rate_limited_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            default_retry_after: Duration::from_secs(config.default_retry_after_secs),
            jitter_percent: config.jitter_percent,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after the `failures`-th failure (0-indexed).
    pub fn backoff(&self, failures: u32) -> Duration {
        calculate_backoff(failures, self.base_delay_ms, self.max_delay_ms, self.jitter_percent)
    }

    /// Run `attempt` until it succeeds or the budget is spent.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, RetriesExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let mut failures = 0u32;
        let mut throttled = 0u32;

        loop {
            match attempt().await {
                Attempt::Success(value) => return Ok(value),
                Attempt::Throttled { retry_after } => {
                    if throttled >= self.max_rate_limited_retries {
                        return Err(RetriesExhausted {
                            attempts: failures + throttled + 1,
                            last: FailureCause::Status(429),
                        });
                    }
                    throttled += 1;
                    let delay = retry_after
                        .unwrap_or(self.default_retry_after)
                        .min(Duration::from_millis(self.max_delay_ms));
                    tracing::warn!(delay = ?delay, throttled, "Remote service throttled request, waiting");
                    tokio::time::sleep(delay).await;
                }
                Attempt::Failed(cause) => {
                    if failures + 1 >= self.max_retries {
                        return Err(RetriesExhausted {
                            attempts: failures + throttled + 1,
                            last: cause,
                        });
                    }
                    let delay = self.backoff(failures);
                    tracing::info!(attempt = failures, delay = ?delay, cause = %cause, "Retrying remote call");
                    failures += 1;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Parse a `Retry-After` header given in whole seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
