//! Per-client security policy snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

/// Enforcement profile selected by the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    #[default]
    None,
    Strict,
    Moderate,
}

/// Immutable security policy, produced only by a successful remote fetch.
///
/// Refreshes replace the whole snapshot; nothing mutates one in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicy {
    pub requests_per_duration: u32,
    pub window_ms: u64,
    pub ban_threshold: u32,
    pub soft_ban_duration_ms: u64,
    pub soft_ban_violations: u32,
    pub allow_empty_user_agents: bool,
    pub enable_honeypot: bool,
    pub check_referer_header: bool,
    pub check_origin_header: bool,
    pub check_accept_header: bool,
    pub limit_exceeded_warn: bool,
    pub limit_exceeded_ban: bool,
    pub security_policy: PolicyMode,
    pub blocked_country_codes: Option<BTreeSet<String>>,
    pub last_synced_at: DateTime<Utc>,
}

impl SecurityPolicy {
    /// Sliding window length.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration '{0}', expected <number><ms|s|m|h|d>")]
pub struct InvalidDuration(pub String);

/// Parse durations such as `"10s"`, `"1m"`, `"500ms"` or `"2h"`.
///
/// A bare number is read as seconds.
pub fn parse_window(input: &str) -> Result<Duration, InvalidDuration> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);

    let amount: u64 = digits
        .parse()
        .map_err(|_| InvalidDuration(input.to_string()))?;

    let millis = match unit.trim() {
        "ms" => Some(amount),
        "" | "s" => amount.checked_mul(1000),
        "m" => amount.checked_mul(60_000),
        "h" => amount.checked_mul(3_600_000),
        "d" => amount.checked_mul(86_400_000),
        _ => None,
    }
    .ok_or_else(|| InvalidDuration(input.to_string()))?;

    if millis == 0 {
        return Err(InvalidDuration(input.to_string()));
    }
    Ok(Duration::from_millis(millis))
}
