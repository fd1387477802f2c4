//! Wire types and errors for the security-policy service.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::resilience::{FailureCause, RetriesExhausted};
use crate::security::policy::{parse_window, PolicyMode, SecurityPolicy};

const DEFAULT_REQUESTS: u32 = 5;
const DEFAULT_WINDOW: &str = "10s";
const DEFAULT_BAN_THRESHOLD: u32 = 10;
const DEFAULT_SOFT_BAN: &str = "1h";
const DEFAULT_SOFT_BAN_VIOLATIONS: u32 = 3;

/// Errors raised at the remote fetch boundary.
///
/// `Clone` so one failed fetch can be handed to every caller that joined it.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("remote service unavailable: {0}")]
    Unavailable(#[from] RetriesExhausted),

    #[error("invalid response from remote service: {0}")]
    InvalidResponse(String),

    #[error("refresh task aborted: {0}")]
    TaskAborted(String),
}

impl RemoteError {
    /// HTTP status of the last failed attempt, if it got that far.
    pub fn last_status(&self) -> Option<u16> {
        match self {
            RemoteError::Unavailable(RetriesExhausted {
                last: FailureCause::Status(status),
                ..
            }) => Some(*status),
            _ => None,
        }
    }
}

/// One entry of the blocked-IP list.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockedIp {
    #[serde(default)]
    pub id: serde_json::Value,
    pub ip: String,
}

/// `GET /api/blockedips` response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannedIpsDocument {
    pub blocked_ips: Vec<BlockedIp>,
}

/// A duration given either as milliseconds or as text like `"10s"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Millis(u64),
    Text(String),
}

impl DurationValue {
    fn to_millis(&self) -> Result<u64, RemoteError> {
        match self {
            DurationValue::Millis(0) => Err(RemoteError::InvalidResponse(
                "duration must be greater than zero".into(),
            )),
            DurationValue::Millis(ms) => Ok(*ms),
            DurationValue::Text(text) => parse_window(text)
                .map(|d| d.as_millis() as u64)
                .map_err(|e| RemoteError::InvalidResponse(e.to_string())),
        }
    }
}

/// Legacy nested rate limit section (`{"rateLimit": {"requests", "duration"}}`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub requests: Option<u32>,
    pub duration: Option<DurationValue>,
}

/// Tenant entity as stored by the policy service. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyDocument {
    pub requests_per_duration: Option<u32>,
    pub duration: Option<DurationValue>,
    pub rate_limit: Option<RateLimitSection>,
    pub ban_threshold: Option<u32>,
    pub soft_ban_duration: Option<DurationValue>,
    pub soft_ban_violations: Option<u32>,
    pub allow_empty_user_agents: Option<bool>,
    pub block_blank_user_agents: Option<bool>,
    pub enable_honeypot: bool,
    pub check_referer_header: bool,
    pub check_origin_header: bool,
    pub check_accept_header: bool,
    pub limit_exceeded_warn: Option<bool>,
    pub limit_exceeded_ban: bool,
    pub security_policy: PolicyMode,
    pub blocked_country_codes: Option<Vec<String>>,
}

/// Entities come back bare or wrapped in a `{"docs": [...]}` listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PolicyResponse {
    Listing { docs: Vec<PolicyDocument> },
    Entity(PolicyDocument),
}

impl PolicyResponse {
    /// The tenant's entity, or an error if the listing was empty.
    pub fn into_document(self) -> Result<PolicyDocument, RemoteError> {
        match self {
            PolicyResponse::Entity(doc) => Ok(doc),
            PolicyResponse::Listing { docs } => docs
                .into_iter()
                .next()
                .ok_or_else(|| RemoteError::InvalidResponse("no entity for tenant".into())),
        }
    }
}

impl PolicyDocument {
    /// Build a snapshot, filling gaps with defaults.
    pub fn into_policy(self, synced_at: DateTime<Utc>) -> Result<SecurityPolicy, RemoteError> {
        let nested = self.rate_limit.unwrap_or_default();

        let requests = nested
            .requests
            .or(self.requests_per_duration)
            .unwrap_or(DEFAULT_REQUESTS);
        if requests == 0 {
            return Err(RemoteError::InvalidResponse(
                "requestsPerDuration must be greater than zero".into(),
            ));
        }

        let window_ms = nested
            .duration
            .or(self.duration)
            .unwrap_or_else(|| DurationValue::Text(DEFAULT_WINDOW.into()))
            .to_millis()?;

        let soft_ban_duration_ms = self
            .soft_ban_duration
            .unwrap_or_else(|| DurationValue::Text(DEFAULT_SOFT_BAN.into()))
            .to_millis()?;

        let allow_empty_user_agents = match (self.allow_empty_user_agents, self.block_blank_user_agents) {
            (Some(allow), _) => allow,
            (None, Some(block)) => !block,
            (None, None) => true,
        };

        let blocked_country_codes = self.blocked_country_codes.map(|codes| {
            codes
                .into_iter()
                .map(|c| c.trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty())
                .collect::<BTreeSet<_>>()
        });

        Ok(SecurityPolicy {
            requests_per_duration: requests,
            window_ms,
            ban_threshold: self.ban_threshold.unwrap_or(DEFAULT_BAN_THRESHOLD),
            soft_ban_duration_ms,
            soft_ban_violations: self.soft_ban_violations.unwrap_or(DEFAULT_SOFT_BAN_VIOLATIONS),
            allow_empty_user_agents,
            enable_honeypot: self.enable_honeypot,
            check_referer_header: self.check_referer_header,
            check_origin_header: self.check_origin_header,
            check_accept_header: self.check_accept_header,
            limit_exceeded_warn: self.limit_exceeded_warn.unwrap_or(true),
            limit_exceeded_ban: self.limit_exceeded_ban,
            security_policy: self.security_policy,
            blocked_country_codes,
            last_synced_at: synced_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> SecurityPolicy {
        serde_json::from_value::<PolicyResponse>(value)
            .unwrap()
            .into_document()
            .unwrap()
            .into_policy(Utc::now())
            .unwrap()
    }

    #[test]
    fn test_empty_entity_uses_defaults() {
        let policy = parse(json!({}));
        assert_eq!(policy.requests_per_duration, 5);
        assert_eq!(policy.window_ms, 10_000);
        assert_eq!(policy.security_policy, PolicyMode::None);
        assert!(policy.allow_empty_user_agents);
        assert!(policy.blocked_country_codes.is_none());
    }

    #[test]
    fn test_flat_entity() {
        let policy = parse(json!({
            "requestsPerDuration": 50,
            "duration": "1m",
            "securityPolicy": "strict",
            "allowEmptyUserAgents": false,
            "blockedCountryCodes": ["ru", " kp ", ""],
            "softBanDuration": 60000
        }));
        assert_eq!(policy.requests_per_duration, 50);
        assert_eq!(policy.window_ms, 60_000);
        assert_eq!(policy.soft_ban_duration_ms, 60_000);
        assert_eq!(policy.security_policy, PolicyMode::Strict);
        assert!(!policy.allow_empty_user_agents);
        let codes: Vec<_> = policy.blocked_country_codes.unwrap().into_iter().collect();
        assert_eq!(codes, vec!["KP", "RU"]);
    }

    #[test]
    fn test_listing_with_nested_rate_limit() {
        let policy = parse(json!({
            "docs": [{
                "rateLimit": { "requests": 7, "duration": "30s" },
                "blockBlankUserAgents": true
            }]
        }));
        assert_eq!(policy.requests_per_duration, 7);
        assert_eq!(policy.window_ms, 30_000);
        assert!(!policy.allow_empty_user_agents);
    }

    #[test]
    fn test_empty_listing_is_invalid() {
        let response: PolicyResponse = serde_json::from_value(json!({ "docs": [] })).unwrap();
        assert!(matches!(
            response.into_document(),
            Err(RemoteError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_zero_quota_is_invalid() {
        let doc: PolicyDocument =
            serde_json::from_value(json!({ "requestsPerDuration": 0 })).unwrap();
        assert!(doc.into_policy(Utc::now()).is_err());
    }

    #[test]
    fn test_last_status() {
        let err = RemoteError::from(RetriesExhausted {
            attempts: 3,
            last: FailureCause::Status(404),
        });
        assert_eq!(err.last_status(), Some(404));
        assert_eq!(RemoteError::InvalidResponse("x".into()).last_status(), None);
    }
}
