//! In-memory copies of the remote security state.
//!
//! # Data Flow
//! ```text
//! request path
//!     → BannedIpCache::get / is_banned      (guard ban check)
//!     → PolicyCache::snapshot               (rate limiter quota)
//!         stale? → refresh_in_background()  (never blocks the request)
//!
//! refreshable.rs
//!     → single shared fetch per cache
//!     → RemoteSecurityService (remote/)
//!     → ArcSwap snapshot replaced on success only
//! ```
//!
//! Both caches are built once at startup and cloned by handle into every
//! component that needs them.

pub mod banned_ips;
pub mod policy;
pub mod refreshable;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::remote::{RemoteError, RemoteSecurityService};

pub use banned_ips::{BannedIpCache, BannedIpFetcher, BannedIpSet};
pub use policy::{PolicyCache, PolicyFetcher};
pub use refreshable::{RefreshableCache, ResourceFetcher};

/// The two caches for one tenant.
#[derive(Clone)]
pub struct SecurityCaches {
    pub banned_ips: BannedIpCache,
    pub policy: PolicyCache,
}

impl SecurityCaches {
    pub fn new(remote: Arc<dyn RemoteSecurityService>, tenant_id: &str, ttl: Duration) -> Self {
        Self {
            banned_ips: BannedIpCache::new(
                BannedIpFetcher::new(Arc::clone(&remote), tenant_id),
                ttl,
            ),
            policy: PolicyCache::new(PolicyFetcher::new(remote, tenant_id), ttl),
        }
    }

    /// Refresh whichever caches are stale.
    pub async fn refresh_all(&self) -> Result<(), RemoteError> {
        let (banned, policy) = tokio::join!(self.banned_ips.refresh(), self.policy.refresh());
        banned.and(policy)
    }

    /// Refetch both resources now, concurrently.
    pub async fn force_refresh_all(&self) -> Result<(), RemoteError> {
        let (banned, policy) = tokio::join!(
            self.banned_ips.force_refresh(),
            self.policy.force_refresh()
        );
        banned.and(policy)
    }

    /// Periodically refresh stale caches until shutdown is signalled.
    pub fn spawn_refresher(
        &self,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let caches = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(interval_secs = interval.as_secs(), "Background cache refresher started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.recv() => break,
                }
                // Failures are logged by the cache and retried next tick
                tokio::select! {
                    _ = caches.refresh_all() => {}
                    _ = shutdown.recv() => break,
                }
            }
            tracing::info!("Background cache refresher stopping");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::BannedIpsDocument;
    use crate::security::policy::{PolicyMode, SecurityPolicy};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingRemote {
        banned_calls: AtomicU32,
        policy_calls: AtomicU32,
    }

    #[async_trait]
    impl RemoteSecurityService for CountingRemote {
        async fn fetch_banned_ips(&self, _tenant_id: &str) -> Result<BannedIpsDocument, RemoteError> {
            self.banned_calls.fetch_add(1, Ordering::SeqCst);
            Ok(BannedIpsDocument { blocked_ips: vec![] })
        }

        async fn fetch_policy(&self, _tenant_id: &str) -> Result<SecurityPolicy, RemoteError> {
            self.policy_calls.fetch_add(1, Ordering::SeqCst);
            Ok(SecurityPolicy {
                requests_per_duration: 5,
                window_ms: 10_000,
                ban_threshold: 10,
                soft_ban_duration_ms: 3_600_000,
                soft_ban_violations: 3,
                allow_empty_user_agents: true,
                enable_honeypot: false,
                check_referer_header: false,
                check_origin_header: false,
                check_accept_header: false,
                limit_exceeded_warn: true,
                limit_exceeded_ban: false,
                security_policy: PolicyMode::None,
                blocked_country_codes: None,
                last_synced_at: Utc::now(),
            })
        }
    }

    struct HangingRemote;

    #[async_trait]
    impl RemoteSecurityService for HangingRemote {
        async fn fetch_banned_ips(&self, _tenant_id: &str) -> Result<BannedIpsDocument, RemoteError> {
            std::future::pending().await
        }

        async fn fetch_policy(&self, _tenant_id: &str) -> Result<SecurityPolicy, RemoteError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresher_stops_during_slow_refresh() {
        let caches = SecurityCaches::new(Arc::new(HangingRemote), "abc123", Duration::from_secs(300));
        let (tx, rx) = broadcast::channel(1);

        let handle = caches.spawn_refresher(Duration::from_secs(60), rx);
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("refresher did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_force_refresh_all_hits_both_resources() {
        let remote = Arc::new(CountingRemote::default());
        let caches = SecurityCaches::new(remote.clone(), "abc123", Duration::from_secs(300));

        caches.force_refresh_all().await.unwrap();
        caches.refresh_all().await.unwrap();

        assert_eq!(remote.banned_calls.load(Ordering::SeqCst), 1);
        assert_eq!(remote.policy_calls.load(Ordering::SeqCst), 1);
        assert_eq!(caches.policy.snapshot().unwrap().requests_per_duration, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresher_stops_on_shutdown() {
        let remote = Arc::new(CountingRemote::default());
        let caches = SecurityCaches::new(remote.clone(), "abc123", Duration::from_secs(300));
        let (tx, rx) = broadcast::channel(1);

        let handle = caches.spawn_refresher(Duration::from_secs(60), rx);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(remote.policy_calls.load(Ordering::SeqCst), 1);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
