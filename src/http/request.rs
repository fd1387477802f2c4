//! Per-request context.
//!
//! Created once when a request enters the guard and dropped with the
//! response. Never persisted.

use axum::http::HeaderMap;
use tokio::time::Instant;
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_CORRELATION_ID: &str = "x-correlation-id";

/// Longest inbound correlation id that is echoed back.
const MAX_CORRELATION_ID_LEN: usize = 128;

/// New opaque request id (32 hex characters).
pub fn generate_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// Inbound `X-Correlation-ID`, or the request id when absent.
    pub correlation_id: String,
    pub client_ip: String,
    pub start_time: Instant,
}

impl RequestContext {
    pub fn new(headers: &HeaderMap, client_ip: String) -> Self {
        let request_id = generate_request_id();
        let correlation_id = headers
            .get(X_CORRELATION_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= MAX_CORRELATION_ID_LEN)
            .map(str::to_string)
            .unwrap_or_else(|| request_id.clone());

        Self {
            request_id,
            correlation_id,
            client_ip,
            start_time: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_request_ids_are_unique_hex() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_correlation_id_defaults_to_request_id() {
        let ctx = RequestContext::new(&HeaderMap::new(), "0.0.0.0".to_string());
        assert_eq!(ctx.correlation_id, ctx.request_id);

        let mut headers = HeaderMap::new();
        headers.insert(X_CORRELATION_ID, HeaderValue::from_static("trace-42"));
        let ctx = RequestContext::new(&headers, "0.0.0.0".to_string());
        assert_eq!(ctx.correlation_id, "trace-42");
    }
}
