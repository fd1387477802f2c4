//! Log gateway library.
//!
//! An HTTP front for application logs whose core is a cached copy of remote
//! security state (banned addresses, per-client policy) and the per-request
//! enforcement built on it.

// Core subsystems
pub mod config;
pub mod http;
pub mod logs;
pub mod signing;

// Security state
pub mod cache;
pub mod remote;
pub mod security;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::GatewayConfig;
pub use http::{AppState, Dependencies, HttpServer};
pub use lifecycle::Shutdown;
