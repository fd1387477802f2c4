//! Configuration schema definitions.
//!
//! Every section derives Serde traits and carries defaults, so a minimal
//! TOML file (or none at all) yields a runnable gateway.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Request timeouts.
    pub timeouts: TimeoutConfig,

    /// Tenant credential used for bearer auth and remote lookups.
    pub tenant: TenantConfig,

    /// Upstream security-policy service.
    pub remote: RemoteConfig,

    /// Refreshable cache tuning.
    pub cache: CacheConfig,

    /// Sliding-window rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Request size, transport and payload limits.
    pub limits: LimitsConfig,

    /// Response signing keys.
    pub signing: SigningConfig,

    /// Log storage.
    pub logs: LogStoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for one inbound request, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Tenant credential.
///
/// The key is `base64("<validationId>:<host>")`. When `key` is unset the
/// value of the environment variable named by `key_env` is used.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TenantConfig {
    pub key: Option<String>,
    pub key_env: String,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            key: None,
            key_env: "ERROR_AWARE_KEY".to_string(),
        }
    }
}

/// Upstream security-policy service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the service (scheme + host).
    pub base_url: String,

    /// User-Agent sent with every call.
    pub user_agent: String,

    /// Attempts allowed for transport errors and non-429 statuses.
    pub max_retries: u32,

    /// Extra attempts allowed for HTTP 429 responses.
    pub max_rate_limited_retries: u32,

    /// Base delay for exponential backoff, in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff delay, in milliseconds.
    pub max_delay_ms: u64,

    /// Delay used when a 429 response carries no usable `Retry-After`.
    pub default_retry_after_secs: u64,

    /// Jitter added to each backoff delay, as a percentage of the delay.
    pub jitter_percent: u8,

    /// Per-attempt HTTP timeout, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://erroraware.com".to_string(),
            user_agent: "ErrorAwareClient/2.18.0".to_string(),
            max_retries: 3,
            max_rate_limited_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            default_retry_after_secs: 5,
            jitter_percent: 0,
            request_timeout_secs: 10,
        }
    }
}

/// Refreshable cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Time a fetched snapshot stays fresh, in seconds.
    pub ttl_secs: u64,

    /// Period of the background refresher in seconds; 0 disables it.
    pub background_refresh_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            background_refresh_secs: 0,
        }
    }
}

/// Backend holding the sliding-window counters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum CountingStoreConfig {
    /// Process-local counters. Only correct for a single instance.
    #[default]
    Memory,
    /// Redis-compatible REST endpoint shared by every instance.
    RedisRest { url: String, token: String },
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Quota used until a security policy has been loaded.
    pub default_requests: u32,

    /// Window used until a security policy has been loaded, in milliseconds.
    pub default_window_ms: u64,

    /// Skip the limiter when no tenant identity is configured.
    pub fail_open_without_tenant: bool,

    /// Value of the `Retry-After` header on 429 responses.
    pub retry_after_secs: u64,

    /// Counter storage.
    pub store: CountingStoreConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_requests: 10,
            default_window_ms: 1000,
            fail_open_without_tenant: true,
            retry_after_secs: 60,
            store: CountingStoreConfig::Memory,
        }
    }
}

/// Request limits enforced by the guard pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,

    /// Reject requests whose `X-Forwarded-Proto` is not `https`.
    pub require_https: bool,

    /// Maximum length of any string value in a verification payload.
    pub max_string_length: usize,

    /// Maximum age of a connection-verification timestamp, in milliseconds.
    pub connection_max_age_ms: i64,

    /// Clock skew tolerated on top of `connection_max_age_ms`.
    pub clock_skew_ms: i64,

    /// Fall back to the socket peer address when no forwarding header is set.
    pub trust_socket_peer: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1MB
            require_https: true,
            max_string_length: 1000,
            connection_max_age_ms: 300_000,
            clock_skew_ms: 30_000,
            trust_socket_peer: false,
        }
    }
}

/// PEM key locations for response signing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    pub private_key_path: String,
    pub public_key_path: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            private_key_path: "keys/private.pem".to_string(),
            public_key_path: "keys/public.pem".to_string(),
        }
    }
}

/// Log storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogStoreConfig {
    /// Root directory; logs land in `<root>/<system>/<MMDDYYYY>.log`.
    pub root: String,

    /// Lines returned by a log read when the caller does not say.
    pub default_lines: usize,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            root: "errorlogs".to_string(),
            default_lines: 100,
        }
    }
}

/// Output format for structured logs.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log output format.
    pub log_format: LogFormat,

    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Prometheus exporter bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_filter: "log_gateway=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
