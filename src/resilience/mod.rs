//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to the security-policy service:
//!     → retries.rs (classify attempt, decide whether to wait and retry)
//!     → backoff.rs (exponential delay for generic failures)
//!     → RetriesExhausted once the budget is spent
//! ```
//!
//! # Design Decisions
//! - Every remote call is bounded: the retry budget caps total latency
//! - 429 waits honour `Retry-After` and never grow the exponential delay

pub mod backoff;
pub mod retries;

pub use retries::{Attempt, FailureCause, RetriesExhausted, RetryPolicy};
