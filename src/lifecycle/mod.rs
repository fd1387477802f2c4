//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Signing keys → Services → Prime caches → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Stop refresher and reload loop → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Force a security state refresh
//! ```
//!
//! # Design Decisions
//! - Fail fast on keys: the gateway never serves unsigned log pages
//! - The remote service being down at startup is not fatal

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_handler, wait_for_termination};
pub use startup::{bind, dependencies_from_config, prime_caches, StartupError};
