//! Security policy cache.

use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::refreshable::{RefreshableCache, ResourceFetcher};
use crate::remote::{RemoteError, RemoteSecurityService};
use crate::security::policy::SecurityPolicy;

/// Fetches the tenant's security policy.
pub struct PolicyFetcher {
    remote: Arc<dyn RemoteSecurityService>,
    tenant_id: String,
}

impl PolicyFetcher {
    pub fn new(remote: Arc<dyn RemoteSecurityService>, tenant_id: impl Into<String>) -> Self {
        Self {
            remote,
            tenant_id: tenant_id.into(),
        }
    }
}

#[async_trait]
impl ResourceFetcher for PolicyFetcher {
    type Output = SecurityPolicy;

    fn resource(&self) -> &'static str {
        "security_policy"
    }

    async fn fetch(&self) -> Result<SecurityPolicy, RemoteError> {
        let policy = self.remote.fetch_policy(&self.tenant_id).await?;
        tracing::info!(
            requests = policy.requests_per_duration,
            window_ms = policy.window_ms,
            mode = ?policy.security_policy,
            "Security policy loaded"
        );
        Ok(policy)
    }
}

/// Cache of the tenant's security policy.
pub type PolicyCache = RefreshableCache<PolicyFetcher>;
