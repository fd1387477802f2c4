//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (pretty for development, JSON for log aggregation)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Request and correlation IDs are attached as span/event fields
//! - Security events (bans, throttling, refresh failures) log at warn or above

pub mod logging;
pub mod metrics;
