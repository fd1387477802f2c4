//! Sliding-window rate limiter keyed by client and source address.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

use crate::cache::PolicyCache;
use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::security::store::CountingStore;

/// Requests allowed per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub requests: u32,
    pub window: Duration,
}

impl From<&RateLimitConfig> for Quota {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            requests: config.default_requests,
            window: Duration::from_millis(config.default_window_ms),
        }
    }
}

/// Millisecond clock anchored to wall time at construction and advanced by
/// the tokio clock, so paused-time tests can move it.
#[derive(Debug, Clone, Copy)]
struct WindowClock {
    anchor: Instant,
    anchor_ms: u64,
}

impl WindowClock {
    fn new() -> Self {
        let anchor_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            anchor: Instant::now(),
            anchor_ms,
        }
    }

    fn now_ms(&self) -> u64 {
        self.anchor_ms + self.anchor.elapsed().as_millis() as u64
    }
}

/// Rate limiter over a shared counting store.
///
/// The quota comes from the current policy snapshot; until one has loaded,
/// the configured default applies.
pub struct RateLimiter {
    store: Arc<dyn CountingStore>,
    policy: Option<PolicyCache>,
    default_quota: Quota,
    clock: WindowClock,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn CountingStore>,
        policy: Option<PolicyCache>,
        default_quota: Quota,
    ) -> Self {
        Self {
            store,
            policy,
            default_quota,
            clock: WindowClock::new(),
        }
    }

    /// Quota in force right now. Never waits on the remote service.
    pub fn current_quota(&self) -> Quota {
        let Some(policy) = &self.policy else {
            return self.default_quota;
        };

        policy.refresh_in_background();
        match policy.snapshot() {
            Some(p) => Quota {
                requests: p.requests_per_duration,
                window: p.window(),
            },
            None => self.default_quota,
        }
    }

    /// Record an attempt and report whether it is within quota.
    ///
    /// Rejected attempts count toward the window too. A failing store lets
    /// the request through.
    pub async fn allow(&self, client_id: &str, source_ip: &str) -> bool {
        let quota = self.current_quota();
        let key = format!("{client_id}:{source_ip}");
        let now_ms = self.clock.now_ms();
        let window_start_ms = now_ms.saturating_sub(quota.window.as_millis() as u64);

        match self.store.record_and_count(&key, window_start_ms, now_ms).await {
            Ok(count) if count <= u64::from(quota.requests) => true,
            Ok(count) => {
                tracing::warn!(
                    client_ip = %source_ip,
                    count,
                    limit = quota.requests,
                    window_ms = quota.window.as_millis() as u64,
                    "Rate limit exceeded"
                );
                metrics::record_rate_limited("client");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Rate limit store failed, allowing request");
                true
            }
        }
    }
}
