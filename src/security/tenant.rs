//! Tenant key decoding and credential comparison.
//!
//! The tenant key is `base64("<validationId>:<host>")`. The validation id is
//! both the bearer credential for privileged routes and the client id used
//! for remote lookups and rate-limit keys.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::TenantConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenantKeyError {
    #[error("tenant key is not valid base64")]
    Encoding,
    #[error("tenant key has an empty validation id")]
    EmptyValidationId,
}

/// Decoded tenant key.
#[derive(Clone, PartialEq, Eq)]
pub struct TenantKey {
    validation_id: String,
    host: Option<String>,
}

impl std::fmt::Debug for TenantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantKey")
            .field("validation_id", &"<redacted>")
            .field("host", &self.host)
            .finish()
    }
}

impl TenantKey {
    /// Decode a base64 tenant key.
    pub fn decode(encoded: &str) -> Result<Self, TenantKeyError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| TenantKeyError::Encoding)?;
        let decoded = String::from_utf8_lossy(&bytes);

        let mut parts = decoded.splitn(2, ':');
        let validation_id = parts.next().unwrap_or_default().trim();
        if validation_id.is_empty() {
            return Err(TenantKeyError::EmptyValidationId);
        }
        let host = parts
            .next()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string);

        Ok(Self {
            validation_id: validation_id.to_string(),
            host,
        })
    }

    pub fn validation_id(&self) -> &str {
        &self.validation_id
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Constant-time comparison against a caller-supplied validation id.
    pub fn matches_validation_id(&self, candidate: &str) -> bool {
        constant_time_eq(self.validation_id.as_bytes(), candidate.as_bytes())
    }

    /// Check an `Authorization` header value for `Bearer <validationId>`.
    pub fn authorizes(&self, authorization: Option<&str>) -> bool {
        match authorization.and_then(|v| v.strip_prefix("Bearer ")) {
            Some(token) => self.matches_validation_id(token),
            None => false,
        }
    }
}

/// Equal-length inputs are compared without data-dependent branching.
/// Length itself is not secret.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Resolve the tenant key from config, falling back to the environment.
///
/// An unusable key is logged and treated as absent.
pub fn resolve_tenant(config: &TenantConfig) -> Option<TenantKey> {
    let encoded = config
        .key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var(&config.key_env).ok().filter(|k| !k.trim().is_empty()))?;

    match TenantKey::decode(&encoded) {
        Ok(key) => {
            tracing::info!(host = ?key.host(), "Tenant key loaded");
            Some(key)
        }
        Err(e) => {
            tracing::error!(error = %e, env = %config.key_env, "Ignoring invalid tenant key");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(raw: &str) -> String {
        STANDARD.encode(raw)
    }

    #[test]
    fn test_decode_splits_validation_id_and_host() {
        let key = TenantKey::decode(&encode("abc123:example.com")).unwrap();
        assert_eq!(key.validation_id(), "abc123");
        assert_eq!(key.host(), Some("example.com"));

        let key = TenantKey::decode(&encode("abc123")).unwrap();
        assert_eq!(key.host(), None);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(TenantKey::decode("!!!"), Err(TenantKeyError::Encoding));
        assert_eq!(
            TenantKey::decode(&encode(":host")),
            Err(TenantKeyError::EmptyValidationId)
        );
    }

    #[test]
    fn test_ownership_comparison() {
        let key = TenantKey::decode(&encode("abc123:host")).unwrap();
        assert!(key.matches_validation_id("abc123"));
        assert!(!key.matches_validation_id("abc124"));
        assert!(!key.matches_validation_id("abc12"));
        assert!(!key.matches_validation_id(""));
    }

    #[test]
    fn test_bearer_authorization() {
        let key = TenantKey::decode(&encode("abc123:host")).unwrap();
        assert!(key.authorizes(Some("Bearer abc123")));
        assert!(!key.authorizes(Some("bearer abc123")));
        assert!(!key.authorizes(Some("Bearer abc1234")));
        assert!(!key.authorizes(Some("abc123")));
        assert!(!key.authorizes(None));
    }

    #[test]
    fn test_config_key_wins_over_env() {
        let config = TenantConfig {
            key: Some(encode("fromconfig:host")),
            key_env: "LOG_GATEWAY_TEST_UNSET_KEY".to_string(),
        };
        assert_eq!(resolve_tenant(&config).unwrap().validation_id(), "fromconfig");

        let config = TenantConfig {
            key: None,
            key_env: "LOG_GATEWAY_TEST_UNSET_KEY".to_string(),
        };
        assert!(resolve_tenant(&config).is_none());
    }

    #[test]
    fn test_debug_redacts_validation_id() {
        let key = TenantKey::decode(&encode("abc123:host")).unwrap();
        assert!(!format!("{key:?}").contains("abc123"));
    }
}
