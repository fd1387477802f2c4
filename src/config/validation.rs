//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and combinations.
//! Every problem is reported, not just the first one.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{CountingStoreConfig, GatewayConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting all errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    if url::Url::parse(&config.remote.base_url).is_err() {
        errors.push(ValidationError::new(
            "remote.base_url",
            format!("'{}' is not a URL", config.remote.base_url),
        ));
    }
    if config.remote.max_retries == 0 {
        errors.push(ValidationError::new("remote.max_retries", "must be > 0"));
    }
    if config.remote.jitter_percent > 100 {
        errors.push(ValidationError::new("remote.jitter_percent", "must be <= 100"));
    }

    if config.cache.ttl_secs == 0 {
        errors.push(ValidationError::new("cache.ttl_secs", "must be > 0"));
    }

    if config.rate_limit.default_requests == 0 {
        errors.push(ValidationError::new("rate_limit.default_requests", "must be > 0"));
    }
    if config.rate_limit.default_window_ms == 0 {
        errors.push(ValidationError::new("rate_limit.default_window_ms", "must be > 0"));
    }
    if let CountingStoreConfig::RedisRest { url, token } = &config.rate_limit.store {
        if url::Url::parse(url).is_err() {
            errors.push(ValidationError::new("rate_limit.store.url", "is not a URL"));
        }
        if token.is_empty() {
            errors.push(ValidationError::new("rate_limit.store.token", "must not be empty"));
        }
    }

    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::new("limits.max_body_size", "must be > 0"));
    }
    if config.limits.connection_max_age_ms < 0 || config.limits.clock_skew_ms < 0 {
        errors.push(ValidationError::new(
            "limits.connection_max_age_ms",
            "connection age and clock skew must not be negative",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.cache.ttl_secs = 0;
        config.rate_limit.store = CountingStoreConfig::RedisRest {
            url: "https://counter.example.com".into(),
            token: String::new(),
        };

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["listener.bind_address", "cache.ttl_secs", "rate_limit.store.token"]
        );
    }
}
