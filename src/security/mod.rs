//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → guard.rs (ordered checks, first failure wins)
//!         → tenant.rs (bearer credential)
//!         → rate_limit.rs + store.rs (sliding window per client:ip)
//!         → limits.rs (declared size, HTTPS)
//!         → cache/ (banned source address)
//!         → validation.rs (verification payload, ownership)
//!     → handler
//!     → headers.rs (security headers on every response)
//! ```
//!
//! # Design Decisions
//! - Fail closed on security decisions; only the rate limiter fails open
//! - No trust in client input beyond the forwarding headers

pub mod guard;
pub mod headers;
pub mod limits;
pub mod policy;
pub mod rate_limit;
pub mod store;
pub mod tenant;
pub mod validation;

pub use guard::{Admitted, Denial, GuardError, GuardProfile, Outcome, RequestGuard};
pub use rate_limit::{Quota, RateLimiter};
pub use store::{CountingStore, MemoryCountingStore, RedisRestStore, StoreError};
pub use tenant::{resolve_tenant, TenantKey};
