//! Verification payload validation.
//!
//! Callers post `{ "payload": { "verificationType": ..., ... } }`. The
//! payload is size-checked field by field and then classified; connection
//! payloads carry a millisecond timestamp that must be recent.

use serde_json::{Map, Value};

use crate::security::guard::GuardError;

/// Classified verification payload.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationPayload {
    /// Liveness handshake from a client platform.
    Connection {
        platform_id: Option<String>,
        timestamp_ms: i64,
    },
    /// Proof that the caller owns the tenant key.
    Ownership { validation_id: String },
    /// Anything else; acknowledged as received.
    Other(Map<String, Value>),
}

/// Limits applied to verification payloads.
#[derive(Debug, Clone, Copy)]
pub struct PayloadLimits {
    pub max_string_length: usize,
    pub connection_max_age_ms: i64,
    pub clock_skew_ms: i64,
}

/// Pull the `payload` object out of a request body.
pub fn extract_payload(body: &[u8]) -> Result<Map<String, Value>, GuardError> {
    let request: Value = serde_json::from_slice(body)
        .map_err(|_| GuardError::InvalidPayload("Invalid JSON payload"))?;

    match request.get("payload") {
        Some(Value::Object(payload)) => Ok(payload.clone()),
        Some(_) => Err(GuardError::InvalidPayload("Invalid payload format")),
        None => Err(GuardError::InvalidPayload("Missing payload")),
    }
}

/// True when every string value is within `max_len` characters.
pub fn strings_within_limit(payload: &Map<String, Value>, max_len: usize) -> bool {
    payload.values().all(|value| match value {
        Value::String(s) => s.chars().count() <= max_len,
        _ => true,
    })
}

/// Whether a connection timestamp is recent enough.
///
/// Accepted when `now - timestamp <= max_age + skew`. Timestamps further
/// than `skew` in the future are rejected.
pub fn connection_is_fresh(timestamp_ms: i64, now_ms: i64, max_age_ms: i64, skew_ms: i64) -> bool {
    let age = now_ms.saturating_sub(timestamp_ms);
    age <= max_age_ms.saturating_add(skew_ms) && age >= -skew_ms
}

/// Validate and classify a payload.
pub fn validate_payload(
    payload: Map<String, Value>,
    limits: PayloadLimits,
    now_ms: i64,
) -> Result<VerificationPayload, GuardError> {
    if !strings_within_limit(&payload, limits.max_string_length) {
        return Err(GuardError::InvalidPayload("Invalid payload format"));
    }

    match payload.get("verificationType").and_then(Value::as_str) {
        Some("connection") => {
            let timestamp_ms = payload
                .get("timestamp")
                .and_then(Value::as_f64)
                .map(|ts| ts as i64)
                .ok_or(GuardError::InvalidVerification)?;

            if !connection_is_fresh(
                timestamp_ms,
                now_ms,
                limits.connection_max_age_ms,
                limits.clock_skew_ms,
            ) {
                return Err(GuardError::ConnectionExpired);
            }

            Ok(VerificationPayload::Connection {
                platform_id: payload
                    .get("platformId")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                timestamp_ms,
            })
        }
        Some("ownership") => match payload.get("validationId").and_then(Value::as_str) {
            Some(id) => Ok(VerificationPayload::Ownership {
                validation_id: id.to_string(),
            }),
            None => Err(GuardError::InvalidPayload("Invalid ownership payload")),
        },
        _ => Ok(VerificationPayload::Other(payload)),
    }
}
