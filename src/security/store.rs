//! Sliding-window counting stores.
//!
//! A store records one attempt for a key and returns how many attempts fall
//! inside `(window_start, now]`, atomically with respect to other callers.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::CountingStoreConfig;

/// Keys tracked by the in-process store before eviction kicks in.
const MAX_TRACKED_KEYS: usize = 10_000;

/// Namespace for counters in a shared Redis.
const REDIS_KEY_PREFIX: &str = "log-gateway:ratelimit:";

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("counting store unavailable: {0}")]
    Unavailable(String),
    #[error("counting store returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Shared counter backend for the rate limiter.
#[async_trait]
pub trait CountingStore: Send + Sync {
    /// Record an attempt at `now_ms` and count attempts newer than
    /// `window_start_ms`, including this one.
    async fn record_and_count(
        &self,
        key: &str,
        window_start_ms: u64,
        now_ms: u64,
    ) -> Result<u64, StoreError>;
}

/// Build the store selected by configuration.
pub fn build_store(
    config: &CountingStoreConfig,
    timeout: Duration,
) -> Result<std::sync::Arc<dyn CountingStore>, StoreError> {
    Ok(match config {
        CountingStoreConfig::Memory => std::sync::Arc::new(MemoryCountingStore::new()),
        CountingStoreConfig::RedisRest { url, token } => {
            std::sync::Arc::new(RedisRestStore::new(url, token, timeout)?)
        }
    })
}

/// Process-local store. Correct only for a single gateway instance.
pub struct MemoryCountingStore {
    windows: DashMap<String, VecDeque<u64>>,
    max_keys: usize,
}

impl MemoryCountingStore {
    pub fn new() -> Self {
        Self::with_max_keys(MAX_TRACKED_KEYS)
    }

    pub fn with_max_keys(max_keys: usize) -> Self {
        Self {
            windows: DashMap::new(),
            max_keys,
        }
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Drop keys with no attempt inside the window, then the least recently
    /// active ones until a quarter of the capacity is free again.
    fn evict(&self, window_start_ms: u64) {
        self.windows
            .retain(|_, window| window.back().is_some_and(|&t| t > window_start_ms));

        let target = self.max_keys - self.max_keys / 4;
        let excess = self.windows.len().saturating_sub(target);
        if excess == 0 {
            return;
        }

        let mut by_last_attempt: Vec<(u64, String)> = self
            .windows
            .iter()
            .map(|entry| (entry.value().back().copied().unwrap_or_default(), entry.key().clone()))
            .collect();
        let excess = excess.min(by_last_attempt.len());
        if excess == 0 {
            return;
        }
        by_last_attempt.select_nth_unstable(excess - 1);
        for (_, key) in by_last_attempt.into_iter().take(excess) {
            self.windows.remove(&key);
        }
        tracing::warn!(evicted = excess, "Rate limit key table full, dropped least recent keys");
    }
}

impl Default for MemoryCountingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CountingStore for MemoryCountingStore {
    async fn record_and_count(
        &self,
        key: &str,
        window_start_ms: u64,
        now_ms: u64,
    ) -> Result<u64, StoreError> {
        let mut created = false;
        let count = {
            let mut window = self.windows.entry(key.to_string()).or_insert_with(|| {
                created = true;
                VecDeque::new()
            });
            while window.front().is_some_and(|&t| t <= window_start_ms) {
                window.pop_front();
            }
            window.push_back(now_ms);
            window.len() as u64
        };

        // Only a new key can push the table over capacity
        if created && self.windows.len() > self.max_keys {
            self.evict(window_start_ms);
        }

        Ok(count)
    }
}

#[derive(Debug, Deserialize)]
struct RedisReply {
    result: Option<Value>,
    error: Option<String>,
}

/// Redis-compatible REST store shared by every gateway instance.
///
/// Each attempt is one `MULTI/EXEC` transaction over a sorted set scored by
/// timestamp.
pub struct RedisRestStore {
    http: reqwest::Client,
    endpoint: Url,
    token: String,
}

impl RedisRestStore {
    pub fn new(url: &str, token: &str, timeout: Duration) -> Result<Self, StoreError> {
        let base = Url::parse(url)
            .map_err(|e| StoreError::Unavailable(format!("invalid store URL '{url}': {e}")))?;
        let endpoint = base
            .join("multi-exec")
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl CountingStore for RedisRestStore {
    async fn record_and_count(
        &self,
        key: &str,
        window_start_ms: u64,
        now_ms: u64,
    ) -> Result<u64, StoreError> {
        let key = format!("{REDIS_KEY_PREFIX}{key}");
        let member = format!("{now_ms}-{}", uuid::Uuid::new_v4().simple());
        let window_ms = now_ms.saturating_sub(window_start_ms).max(1);

        let commands = json!([
            ["ZREMRANGEBYSCORE", key, "-inf", window_start_ms.to_string()],
            ["ZADD", key, now_ms.to_string(), member],
            ["ZCARD", key],
            ["PEXPIRE", key, window_ms.to_string()],
        ]);

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .json(&commands)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Unavailable(format!(
                "status {}",
                response.status().as_u16()
            )));
        }

        let replies: Vec<RedisReply> = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        if let Some(error) = replies.iter().find_map(|r| r.error.clone()) {
            return Err(StoreError::InvalidResponse(error));
        }

        replies
            .get(2)
            .and_then(|r| r.result.as_ref())
            .and_then(Value::as_u64)
            .ok_or_else(|| StoreError::InvalidResponse("missing ZCARD result".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_memory_store_slides() {
        let store = MemoryCountingStore::new();
        assert_eq!(store.record_and_count("k", 0, 100).await.unwrap(), 1);
        assert_eq!(store.record_and_count("k", 0, 200).await.unwrap(), 2);
        // Window now starts at 100, so the first attempt falls out
        assert_eq!(store.record_and_count("k", 100, 300).await.unwrap(), 2);
        assert_eq!(store.record_and_count("other", 100, 300).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_evicts_idle_keys() {
        let store = MemoryCountingStore::with_max_keys(2);
        store.record_and_count("a", 0, 10).await.unwrap();
        store.record_and_count("b", 0, 20).await.unwrap();
        store.record_and_count("c", 50, 100).await.unwrap();
        assert_eq!(store.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_caps_active_keys() {
        let store = MemoryCountingStore::with_max_keys(4);
        for (i, key) in ["k0", "k1", "k2", "k3", "k4"].iter().enumerate() {
            store.record_and_count(key, 0, 10 * (i as u64 + 1)).await.unwrap();
        }
        // Every key is inside the window, so the two least recent go
        assert_eq!(store.tracked_keys(), 3);

        // Freed headroom means the next new key does not trigger a sweep
        store.record_and_count("k5", 0, 60).await.unwrap();
        assert_eq!(store.tracked_keys(), 4);
        assert_eq!(store.record_and_count("k4", 0, 70).await.unwrap(), 2);
        assert_eq!(store.record_and_count("k0", 0, 80).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_redis_store_reads_zcard() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/multi-exec"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "result": 0 },
                { "result": 1 },
                { "result": 4 },
                { "result": 1 }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let store = RedisRestStore::new(&server.uri(), "secret", Duration::from_secs(2)).unwrap();
        assert_eq!(store.record_and_count("c:1.2.3.4", 0, 1000).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_redis_store_surfaces_errors() {
        let server = MockServer::start().await;
        Mock::given(path("/multi-exec"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "error": "WRONGTYPE" }
            ])))
            .mount(&server)
            .await;

        let store = RedisRestStore::new(&server.uri(), "secret", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            store.record_and_count("k", 0, 1).await,
            Err(StoreError::InvalidResponse(_))
        ));
    }
}
