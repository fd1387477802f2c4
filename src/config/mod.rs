//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! gateway.toml (or $GATEWAY_CONFIG)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via ArcSwap with the request path
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads + validates
//!     → server swaps the live Arc<GatewayConfig>
//! ```

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_or_default, ConfigError};
pub use schema::{
    CacheConfig, CountingStoreConfig, GatewayConfig, LimitsConfig, ListenerConfig, LogFormat,
    LogStoreConfig, ObservabilityConfig, RateLimitConfig, RemoteConfig, SigningConfig,
    TenantConfig, TimeoutConfig,
};
