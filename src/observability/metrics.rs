//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, status
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_denied_total` (counter): guard denials by reason
//! - `gateway_rate_limited_total` (counter): limiter rejections by scope
//! - `gateway_cache_refresh_total` (counter): fetches by resource, outcome
//! - `gateway_banned_ips` (gauge): size of the current banned-IP list
//!
//! All recorders are no-ops until [`init_metrics`] installs the exporter.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::time::Instant;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one completed request.
pub fn record_request(method: &str, route: &str, status: u16, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a guard denial.
pub fn record_denied(reason: &'static str) {
    metrics::counter!("gateway_denied_total", "reason" => reason).increment(1);
}

/// Record a rate limiter rejection.
pub fn record_rate_limited(scope: &'static str) {
    metrics::counter!("gateway_rate_limited_total", "scope" => scope).increment(1);
}

/// Record the outcome of one cache fetch.
pub fn record_cache_refresh(resource: &'static str, outcome: &'static str) {
    metrics::counter!(
        "gateway_cache_refresh_total",
        "resource" => resource,
        "outcome" => outcome
    )
    .increment(1);
}

/// Publish the size of the banned-IP list.
pub fn record_banned_ips(count: usize) {
    metrics::gauge!("gateway_banned_ips").set(count as f64);
}
