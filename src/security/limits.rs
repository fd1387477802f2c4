//! Transport-level request limits.
//!
//! Both checks look at headers only, so they run before any body is read.

use axum::http::header::{HeaderMap, CONTENT_LENGTH};

/// Declared body length, if present and well formed.
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// True when the declared body length exceeds `max_body_size`.
///
/// A missing length passes; the body read itself is capped later.
pub fn exceeds_body_limit(headers: &HeaderMap, max_body_size: usize) -> bool {
    content_length(headers).is_some_and(|len| len > max_body_size as u64)
}

/// True when the terminating proxy reports an HTTPS connection.
pub fn is_https(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}
