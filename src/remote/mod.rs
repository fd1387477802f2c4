//! Remote security-policy service.
//!
//! # Data Flow
//! ```text
//! cache refresh
//!     → RemoteSecurityService::fetch_banned_ips / fetch_policy
//!     → client.rs (HTTPS GET, bounded retry via resilience/)
//!     → types.rs (decode wire documents, build SecurityPolicy)
//!     → Result<_, RemoteError> back to the cache layer
//! ```
//!
//! # Design Decisions
//! - The trait is the seam for tests: caches take any implementation
//! - Errors are `Clone` so a single-flight fetch can fan its failure out

pub mod client;
pub mod types;

use async_trait::async_trait;

use crate::security::policy::SecurityPolicy;

pub use client::HttpSecurityClient;
pub use types::{BannedIpsDocument, BlockedIp, RemoteError};

/// Authoritative source of the two remote resources the gateway caches.
#[async_trait]
pub trait RemoteSecurityService: Send + Sync {
    /// Current banned-IP list for the tenant.
    async fn fetch_banned_ips(&self, tenant_id: &str) -> Result<BannedIpsDocument, RemoteError>;

    /// Current security policy for the tenant.
    async fn fetch_policy(&self, tenant_id: &str) -> Result<SecurityPolicy, RemoteError>;
}
