//! Banned-IP list cache.

use async_trait::async_trait;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use crate::cache::refreshable::{RefreshableCache, ResourceFetcher};
use crate::observability::metrics;
use crate::remote::{BannedIpsDocument, RemoteError, RemoteSecurityService};

/// Normalize an address for set membership.
///
/// Parseable addresses go through `IpAddr` (so `::ffff:10.0.0.1` and
/// `10.0.0.1` compare equal); anything else is only trimmed.
pub fn normalize_ip(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.parse::<IpAddr>() {
        Ok(ip) => ip.to_canonical().to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Set of banned addresses from one successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BannedIpSet {
    ips: HashSet<String>,
}

impl BannedIpSet {
    pub fn contains(&self, ip: &str) -> bool {
        self.ips.contains(&normalize_ip(ip))
    }

    pub fn len(&self) -> usize {
        self.ips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ips.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for BannedIpSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ips: iter
                .into_iter()
                .map(|ip| normalize_ip(ip.as_ref()))
                .filter(|ip| !ip.is_empty())
                .collect(),
        }
    }
}

impl From<BannedIpsDocument> for BannedIpSet {
    fn from(doc: BannedIpsDocument) -> Self {
        doc.blocked_ips.iter().map(|b| b.ip.as_str()).collect()
    }
}

/// Fetches the tenant's banned-IP list.
pub struct BannedIpFetcher {
    remote: Arc<dyn RemoteSecurityService>,
    tenant_id: String,
}

impl BannedIpFetcher {
    pub fn new(remote: Arc<dyn RemoteSecurityService>, tenant_id: impl Into<String>) -> Self {
        Self {
            remote,
            tenant_id: tenant_id.into(),
        }
    }
}

#[async_trait]
impl ResourceFetcher for BannedIpFetcher {
    type Output = BannedIpSet;

    fn resource(&self) -> &'static str {
        "banned_ips"
    }

    async fn fetch(&self) -> Result<BannedIpSet, RemoteError> {
        let set = match self.remote.fetch_banned_ips(&self.tenant_id).await {
            Ok(doc) => BannedIpSet::from(doc),
            // No list has been configured for this tenant
            Err(e) if e.last_status() == Some(404) => {
                tracing::warn!(tenant = %self.tenant_id, "Blocked IP list not found, treating as empty");
                BannedIpSet::default()
            }
            Err(e) => return Err(e),
        };

        metrics::record_banned_ips(set.len());
        tracing::info!(count = set.len(), "Banned IP list loaded");
        Ok(set)
    }
}

/// Cache of the banned-IP list.
pub type BannedIpCache = RefreshableCache<BannedIpFetcher>;

impl RefreshableCache<BannedIpFetcher> {
    /// Whether `ip` is in the last fetched list. Never fetches.
    pub fn is_banned(&self, ip: &str) -> bool {
        self.snapshot().is_some_and(|set| set.contains(ip))
    }
}
