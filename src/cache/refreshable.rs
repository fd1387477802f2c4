//! TTL-gated, single-flight cache around one remote resource.
//!
//! # Invariants
//! - At most one fetch is outstanding per cache. Callers arriving while it
//!   runs await the same shared future.
//! - The fetch runs on its own task, so it completes and stores its result
//!   even when every caller waiting on it has gone away.
//! - `value` is either absent (never fetched) or the last successful
//!   snapshot. A failed fetch leaves it, and `last_fetched_at`, untouched,
//!   so the next call retries immediately.
//! - Snapshots are swapped whole through `ArcSwapOption`; readers never see
//!   a partially updated value.

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::remote::RemoteError;

/// Loads one resource from its authoritative source.
#[async_trait]
pub trait ResourceFetcher: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    /// Resource name used in logs and metrics.
    fn resource(&self) -> &'static str;

    async fn fetch(&self) -> Result<Self::Output, RemoteError>;
}

type InFlight = Shared<BoxFuture<'static, Result<(), RemoteError>>>;

struct Inner<F: ResourceFetcher> {
    fetcher: F,
    ttl: Duration,
    value: ArcSwapOption<F::Output>,
    last_fetched_at: Mutex<Option<Instant>>,
    in_flight: Mutex<Option<InFlight>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<F: ResourceFetcher> Inner<F> {
    fn should_refetch(&self) -> bool {
        match *lock(&self.last_fetched_at) {
            None => true,
            Some(at) => at.elapsed() > self.ttl,
        }
    }

    async fn run_fetch(self: Arc<Self>) -> Result<(), RemoteError> {
        let resource = self.fetcher.resource();
        tracing::debug!(resource, "Fetching remote resource");

        let outcome = match self.fetcher.fetch().await {
            Ok(value) => {
                self.value.store(Some(Arc::new(value)));
                *lock(&self.last_fetched_at) = Some(Instant::now());
                metrics::record_cache_refresh(resource, "success");
                tracing::debug!(resource, "Remote resource refreshed");
                Ok(())
            }
            Err(e) => {
                metrics::record_cache_refresh(resource, "failure");
                tracing::warn!(
                    resource,
                    error = %e,
                    has_snapshot = self.value.load().is_some(),
                    "Refresh failed, keeping last known snapshot"
                );
                Err(e)
            }
        };

        *lock(&self.in_flight) = None;
        outcome
    }
}

/// Shared handle to a refreshable cache. Clones point at the same entry.
pub struct RefreshableCache<F: ResourceFetcher> {
    inner: Arc<Inner<F>>,
}

impl<F: ResourceFetcher> Clone for RefreshableCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ResourceFetcher> RefreshableCache<F> {
    /// Create an empty cache. Nothing is fetched until first use.
    pub fn new(fetcher: F, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                ttl,
                value: ArcSwapOption::empty(),
                last_fetched_at: Mutex::new(None),
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Current snapshot without any fetching.
    pub fn snapshot(&self) -> Option<Arc<F::Output>> {
        self.inner.value.load_full()
    }

    /// When the current snapshot was fetched.
    pub fn last_fetched_at(&self) -> Option<Instant> {
        *lock(&self.inner.last_fetched_at)
    }

    /// True when never fetched or older than the TTL.
    pub fn should_refetch(&self) -> bool {
        self.inner.should_refetch()
    }

    /// Current value, stale or not.
    ///
    /// A stale value is returned immediately and refreshed in the
    /// background. Only a cache that has never been populated makes the
    /// caller wait for the fetch.
    pub async fn get(&self) -> Result<Arc<F::Output>, RemoteError> {
        if let Some(value) = self.snapshot() {
            self.refresh_in_background();
            return Ok(value);
        }

        self.refresh().await?;
        self.snapshot().ok_or_else(|| {
            RemoteError::InvalidResponse(format!(
                "{} fetch completed without a value",
                self.inner.fetcher.resource()
            ))
        })
    }

    /// Fetch if stale, joining any fetch already in flight.
    pub async fn refresh(&self) -> Result<(), RemoteError> {
        match self.begin(false) {
            Some(fetch) => fetch.await,
            None => Ok(()),
        }
    }

    /// Fetch regardless of age, joining any fetch already in flight.
    pub async fn force_refresh(&self) -> Result<(), RemoteError> {
        match self.begin(true) {
            Some(fetch) => fetch.await,
            None => Ok(()),
        }
    }

    /// Start a refresh on a background task if the snapshot is stale.
    ///
    /// Errors are logged by the fetch itself and otherwise dropped.
    pub fn refresh_in_background(&self) {
        // The fetch task runs on its own; nobody needs to await the handle
        let _ = self.begin(false);
    }

    fn begin(&self, force: bool) -> Option<InFlight> {
        let mut slot = lock(&self.inner.in_flight);
        if let Some(existing) = slot.as_ref() {
            return Some(existing.clone());
        }
        if !force && !self.inner.should_refetch() {
            return None;
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(Arc::clone(&inner).run_fetch());
        let fetch = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // run_fetch never reached its cleanup
                    *lock(&inner.in_flight) = None;
                    Err(RemoteError::TaskAborted(e.to_string()))
                }
            }
        }
        .boxed()
        .shared();
        *slot = Some(fetch.clone());
        Some(fetch)
    }
}
