//! Security response headers and client address resolution.
//!
//! # Responsibilities
//! - Stamp the fixed security headers on every gateway response
//! - Resolve the caller's address from forwarding headers
//!
//! # Design Decisions
//! - Forwarding headers are trusted; the gateway runs behind a proxy or CDN
//! - The socket peer is only used when explicitly enabled

use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_SECURITY_POLICY,
    STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
};
use std::net::SocketAddr;

/// Address used when no source can be determined.
pub const UNKNOWN_CLIENT_IP: &str = "0.0.0.0";

/// Headers consulted for the client address, in priority order.
const CLIENT_IP_HEADERS: [&str; 5] = [
    "x-forwarded-for",
    "cf-connecting-ip",
    "fastly-client-ip",
    "true-client-ip",
    "x-real-ip",
];

/// Fixed headers attached to every response.
pub fn security_headers() -> [(HeaderName, HeaderValue); 5] {
    [
        (
            STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ),
        (
            CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        ),
        (X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        (CACHE_CONTROL, HeaderValue::from_static("no-store")),
    ]
}

/// Insert the security headers, replacing any existing values.
pub fn apply_security_headers(headers: &mut HeaderMap) {
    for (name, value) in security_headers() {
        headers.insert(name, value);
    }
}

/// Resolve the client address for rate limiting and ban checks.
///
/// Only the first `X-Forwarded-For` hop is used.
pub fn resolve_client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_socket_peer: bool,
) -> String {
    for name in CLIENT_IP_HEADERS {
        let candidate = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = candidate {
            return ip.to_string();
        }
    }

    match peer {
        Some(addr) if trust_socket_peer => addr.ip().to_string(),
        _ => UNKNOWN_CLIENT_IP.to_string(),
    }
}
