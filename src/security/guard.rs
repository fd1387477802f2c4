//! Ordered per-request security checks.
//!
//! # Order
//! 1. tenant identity (and bearer credential where the route needs it)
//! 2. rate limit
//! 3. declared body size
//! 4. HTTPS transport
//! 5. banned source address
//! 6. payload validation (size, shape, connection freshness)
//! 7. ownership
//!
//! The first failure ends the check. Later steps never run, so a request
//! denied early neither consumes rate-limit quota nor triggers a ban-list
//! refresh.

use arc_swap::ArcSwap;
use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::{header::AUTHORIZATION, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

use crate::cache::BannedIpCache;
use crate::config::GatewayConfig;
use crate::http::request::RequestContext;
use crate::http::response::ErrorReply;
use crate::observability::metrics;
use crate::security::headers::resolve_client_ip;
use crate::security::limits::{exceeds_body_limit, is_https};
use crate::security::rate_limit::RateLimiter;
use crate::security::tenant::TenantKey;
use crate::security::validation::{
    extract_payload, validate_payload, PayloadLimits, VerificationPayload,
};

/// Reasons a request is denied. `Display` is the client-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },
    #[error("Request too large")]
    PayloadTooLarge,
    #[error("HTTPS required")]
    InsecureTransport,
    #[error("Forbidden")]
    BannedSource,
    #[error("{0}")]
    InvalidPayload(&'static str),
    #[error("Invalid verification token")]
    InvalidVerification,
    #[error("Connection verification failed")]
    ConnectionExpired,
    #[error("ERROR_AWARE_KEY does not match")]
    OwnershipMismatch,
    #[error("ERROR_AWARE_KEY not configured")]
    TenantNotConfigured,
    #[error("Internal server error")]
    RemoteUnavailable,
}

impl GuardError {
    pub fn status(&self) -> StatusCode {
        match self {
            GuardError::Unauthorized => StatusCode::UNAUTHORIZED,
            GuardError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GuardError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GuardError::InsecureTransport | GuardError::BannedSource => StatusCode::FORBIDDEN,
            GuardError::InvalidPayload(_)
            | GuardError::InvalidVerification
            | GuardError::ConnectionExpired
            | GuardError::OwnershipMismatch => StatusCode::BAD_REQUEST,
            GuardError::TenantNotConfigured | GuardError::RemoteUnavailable => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            GuardError::Unauthorized => "unauthorized",
            GuardError::RateLimited { .. } => "rate_limited",
            GuardError::PayloadTooLarge => "payload_too_large",
            GuardError::InsecureTransport => "insecure_transport",
            GuardError::BannedSource => "banned_source",
            GuardError::InvalidPayload(_) => "invalid_payload",
            GuardError::InvalidVerification => "invalid_verification",
            GuardError::ConnectionExpired => "connection_expired",
            GuardError::OwnershipMismatch => "ownership_mismatch",
            GuardError::TenantNotConfigured => "tenant_not_configured",
            GuardError::RemoteUnavailable => "remote_unavailable",
        }
    }

    /// Client reply carrying `request_id`.
    pub fn reply(&self, request_id: &str) -> ErrorReply {
        let reply = ErrorReply::new(self.status(), self.to_string(), request_id);
        match self {
            GuardError::RateLimited { retry_after_secs } => reply.retry_after(*retry_after_secs),
            _ => reply,
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        self.reply(&crate::http::request::generate_request_id())
            .into_response()
    }
}

/// Which checks a route runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardProfile {
    pub require_bearer: bool,
    pub rate_limit: bool,
    pub body_limit: bool,
    pub require_https: bool,
    pub ban_check: bool,
    /// Read the body (capped at the size limit) and hand it to the handler.
    pub read_body: bool,
    /// Validate the body as a verification payload. Implies `read_body`.
    pub verify_payload: bool,
}

impl GuardProfile {
    /// No checks; only builds the request context.
    pub const PUBLIC: Self = Self {
        require_bearer: false,
        rate_limit: false,
        body_limit: false,
        require_https: false,
        ban_check: false,
        read_body: false,
        verify_payload: false,
    };

    /// `POST /logger`: authenticated log ingestion.
    pub const INGEST: Self = Self {
        require_bearer: true,
        rate_limit: false,
        body_limit: true,
        require_https: true,
        ban_check: true,
        read_body: true,
        verify_payload: false,
    };

    /// `GET /logger`: signed log reads.
    pub const LOG_READ: Self = Self {
        require_bearer: true,
        rate_limit: true,
        body_limit: false,
        require_https: false,
        ban_check: true,
        read_body: false,
        verify_payload: false,
    };

    /// `POST /logger/.well-known`: connection and ownership verification.
    pub const VERIFICATION: Self = Self {
        require_bearer: false,
        rate_limit: true,
        body_limit: true,
        require_https: true,
        ban_check: true,
        read_body: true,
        verify_payload: true,
    };

    /// Cache refresh triggers.
    pub const REFRESH: Self = Self {
        require_bearer: false,
        rate_limit: true,
        body_limit: false,
        require_https: false,
        ban_check: false,
        read_body: false,
        verify_payload: false,
    };
}

/// A request that passed every check.
#[derive(Debug)]
pub struct Admitted {
    pub context: RequestContext,
    pub body: Option<Bytes>,
    pub verification: Option<VerificationPayload>,
}

/// A denied request.
#[derive(Debug)]
pub struct Denial {
    pub error: GuardError,
    pub context: RequestContext,
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        self.error.reply(&self.context.request_id).into_response()
    }
}

/// Result of [`RequestGuard::check`].
#[derive(Debug)]
pub enum Outcome {
    Allow(Admitted),
    Deny(Denial),
}

/// Runs the ordered checks against live configuration.
pub struct RequestGuard {
    config: Arc<ArcSwap<GatewayConfig>>,
    tenant: Option<TenantKey>,
    limiter: RateLimiter,
    banned_ips: Option<BannedIpCache>,
}

impl RequestGuard {
    pub fn new(
        config: Arc<ArcSwap<GatewayConfig>>,
        tenant: Option<TenantKey>,
        limiter: RateLimiter,
        banned_ips: Option<BannedIpCache>,
    ) -> Self {
        Self {
            config,
            tenant,
            limiter,
            banned_ips,
        }
    }

    pub fn tenant(&self) -> Option<&TenantKey> {
        self.tenant.as_ref()
    }

    /// Run the checks `profile` selects, in order.
    pub async fn check(&self, request: Request<Body>, profile: GuardProfile) -> Outcome {
        let (parts, body) = request.into_parts();
        let config = self.config.load_full();
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let client_ip = resolve_client_ip(&parts.headers, peer, config.limits.trust_socket_peer);
        let context = RequestContext::new(&parts.headers, client_ip);

        match self
            .run_checks(&parts.headers, body, profile, &config, &context)
            .await
        {
            Ok((body, verification)) => Outcome::Allow(Admitted {
                context,
                body,
                verification,
            }),
            Err(error) => {
                tracing::warn!(
                    request_id = %context.request_id,
                    client_ip = %context.client_ip,
                    reason = error.reason(),
                    "Request denied"
                );
                metrics::record_denied(error.reason());
                Outcome::Deny(Denial { error, context })
            }
        }
    }

    async fn run_checks(
        &self,
        headers: &HeaderMap,
        body: Body,
        profile: GuardProfile,
        config: &GatewayConfig,
        context: &RequestContext,
    ) -> Result<(Option<Bytes>, Option<VerificationPayload>), GuardError> {
        let limiting = profile.rate_limit && config.rate_limit.enabled;

        // 1. identity
        let identity_required =
            profile.require_bearer || (limiting && !config.rate_limit.fail_open_without_tenant);
        if identity_required && self.tenant.is_none() {
            return Err(GuardError::Unauthorized);
        }
        if profile.require_bearer {
            let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
            if !self.tenant.as_ref().is_some_and(|t| t.authorizes(authorization)) {
                return Err(GuardError::Unauthorized);
            }
        }

        // 2. rate limit
        if limiting {
            match &self.tenant {
                Some(tenant) => {
                    if !self.limiter.allow(tenant.validation_id(), &context.client_ip).await {
                        return Err(GuardError::RateLimited {
                            retry_after_secs: config.rate_limit.retry_after_secs,
                        });
                    }
                }
                None => tracing::debug!("No tenant configured, skipping rate limit"),
            }
        }

        // 3. declared size
        if profile.body_limit && exceeds_body_limit(headers, config.limits.max_body_size) {
            return Err(GuardError::PayloadTooLarge);
        }

        // 4. transport
        if profile.require_https && config.limits.require_https && !is_https(headers) {
            return Err(GuardError::InsecureTransport);
        }

        // 5. banned source
        if profile.ban_check {
            if let Some(cache) = &self.banned_ips {
                let banned = cache.get().await.map_err(|e| {
                    tracing::error!(error = %e, "No banned IP list available");
                    GuardError::RemoteUnavailable
                })?;
                if banned.contains(&context.client_ip) {
                    tracing::warn!(client_ip = %context.client_ip, "Banned IP request denied");
                    return Err(GuardError::BannedSource);
                }
            }
        }

        if !(profile.read_body || profile.verify_payload) {
            return Ok((None, None));
        }

        // Actual size is capped even when no length was declared
        let bytes = axum::body::to_bytes(body, config.limits.max_body_size)
            .await
            .map_err(|_| GuardError::PayloadTooLarge)?;

        if !profile.verify_payload {
            return Ok((Some(bytes), None));
        }

        // 6. payload
        let limits = PayloadLimits {
            max_string_length: config.limits.max_string_length,
            connection_max_age_ms: config.limits.connection_max_age_ms,
            clock_skew_ms: config.limits.clock_skew_ms,
        };
        let payload = extract_payload(&bytes)?;
        let verification = validate_payload(payload, limits, Utc::now().timestamp_millis())?;

        // 7. ownership
        if let VerificationPayload::Ownership { validation_id } = &verification {
            let tenant = self.tenant.as_ref().ok_or(GuardError::TenantNotConfigured)?;
            if !tenant.matches_validation_id(validation_id) {
                return Err(GuardError::OwnershipMismatch);
            }
        }

        Ok((Some(bytes), Some(verification)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BannedIpFetcher;
    use crate::remote::{BannedIpsDocument, BlockedIp, RemoteError, RemoteSecurityService};
    use crate::security::policy::SecurityPolicy;
    use crate::security::rate_limit::Quota;
    use crate::security::store::{CountingStore, StoreError};
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingBans {
        calls: AtomicU32,
        banned: Vec<&'static str>,
    }

    #[async_trait]
    impl RemoteSecurityService for CountingBans {
        async fn fetch_banned_ips(&self, _tenant_id: &str) -> Result<BannedIpsDocument, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(BannedIpsDocument {
                blocked_ips: self
                    .banned
                    .iter()
                    .map(|ip| BlockedIp {
                        id: json!(1),
                        ip: ip.to_string(),
                    })
                    .collect(),
            })
        }

        async fn fetch_policy(&self, _tenant_id: &str) -> Result<SecurityPolicy, RemoteError> {
            Err(RemoteError::InvalidResponse("no policy in tests".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        calls: AtomicU32,
        count: u64,
    }

    #[async_trait]
    impl CountingStore for RecordingStore {
        async fn record_and_count(&self, _key: &str, _start: u64, _now: u64) -> Result<u64, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.count)
        }
    }

    struct Fixture {
        guard: RequestGuard,
        bans: Arc<CountingBans>,
        store: Arc<RecordingStore>,
    }

    fn tenant() -> TenantKey {
        TenantKey::decode(&STANDARD.encode("abc123:host")).unwrap()
    }

    fn fixture(banned: Vec<&'static str>, store_count: u64, tenant: Option<TenantKey>) -> Fixture {
        let bans = Arc::new(CountingBans {
            banned,
            ..CountingBans::default()
        });
        let store = Arc::new(RecordingStore {
            count: store_count,
            ..RecordingStore::default()
        });
        let cache = BannedIpCache::new(
            BannedIpFetcher::new(bans.clone(), "abc123"),
            Duration::from_secs(300),
        );
        let limiter = RateLimiter::new(
            store.clone(),
            None,
            Quota {
                requests: 10,
                window: Duration::from_secs(1),
            },
        );
        let config = Arc::new(ArcSwap::from_pointee(GatewayConfig::default()));
        Fixture {
            guard: RequestGuard::new(config, tenant, limiter, Some(cache)),
            bans,
            store,
        }
    }

    fn request() -> axum::http::request::Builder {
        Request::builder()
            .method("POST")
            .uri("/logger/.well-known")
            .header("x-forwarded-proto", "https")
            .header("x-forwarded-for", "203.0.113.9")
    }

    fn with_body(builder: axum::http::request::Builder, body: serde_json::Value) -> Request<Body> {
        let bytes = serde_json::to_vec(&body).unwrap();
        builder
            .header("content-length", bytes.len().to_string())
            .body(Body::from(bytes))
            .unwrap()
    }

    fn deny_reason(outcome: Outcome) -> GuardError {
        match outcome {
            Outcome::Deny(denial) => denial.error,
            Outcome::Allow(_) => panic!("expected denial"),
        }
    }

    #[tokio::test]
    async fn test_rate_limited_request_skips_later_checks() {
        let f = fixture(vec![], 11, Some(tenant()));
        let body = json!({ "payload": { "verificationType": "connection", "timestamp": 0 } });
        let req = with_body(request(), body);

        let err = deny_reason(f.guard.check(req, GuardProfile::VERIFICATION).await);
        assert_eq!(err, GuardError::RateLimited { retry_after_secs: 60 });
        assert_eq!(f.store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.bans.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_request_consumes_no_quota() {
        let f = fixture(vec![], 1, Some(tenant()));
        let req = Request::builder()
            .uri("/logger?type=app&date=01012025")
            .header("authorization", "Bearer wrong")
            .body(Body::empty())
            .unwrap();

        let err = deny_reason(f.guard.check(req, GuardProfile::LOG_READ).await);
        assert_eq!(err, GuardError::Unauthorized);
        assert_eq!(f.store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.bans.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_plain_http_rejected_before_ban_check() {
        let f = fixture(vec!["203.0.113.9"], 1, Some(tenant()));
        let body = json!({ "payload": {} });
        let bytes = serde_json::to_vec(&body).unwrap();
        let req = Request::builder()
            .method("POST")
            .header("x-forwarded-proto", "http")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::from(bytes))
            .unwrap();

        let err = deny_reason(f.guard.check(req, GuardProfile::VERIFICATION).await);
        assert_eq!(err, GuardError::InsecureTransport);
        assert_eq!(f.bans.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_declared_body() {
        let f = fixture(vec![], 1, Some(tenant()));
        let req = request()
            .header("content-length", (2 * 1024 * 1024).to_string())
            .body(Body::empty())
            .unwrap();

        let err = deny_reason(f.guard.check(req, GuardProfile::VERIFICATION).await);
        assert_eq!(err, GuardError::PayloadTooLarge);
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_banned_source_gets_generic_denial() {
        let f = fixture(vec!["203.0.113.9"], 1, Some(tenant()));
        let body = json!({ "payload": { "hello": "world" } });
        let req = with_body(request(), body);

        let err = deny_reason(f.guard.check(req, GuardProfile::VERIFICATION).await);
        assert_eq!(err, GuardError::BannedSource);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "Forbidden");
    }

    #[tokio::test]
    async fn test_ownership_match_and_mismatch() {
        let f = fixture(vec![], 1, Some(tenant()));

        let body = json!({ "payload": { "verificationType": "ownership", "validationId": "abc123" } });
        match f.guard.check(with_body(request(), body), GuardProfile::VERIFICATION).await {
            Outcome::Allow(admitted) => assert_eq!(
                admitted.verification,
                Some(VerificationPayload::Ownership {
                    validation_id: "abc123".to_string()
                })
            ),
            Outcome::Deny(d) => panic!("unexpected denial: {:?}", d.error),
        }

        let body = json!({ "payload": { "verificationType": "ownership", "validationId": "abc124" } });
        let err = deny_reason(
            f.guard
                .check(with_body(request(), body), GuardProfile::VERIFICATION)
                .await,
        );
        assert_eq!(err, GuardError::OwnershipMismatch);
        assert_eq!(err.to_string(), "ERROR_AWARE_KEY does not match");
    }

    #[tokio::test]
    async fn test_fresh_connection_admitted() {
        let f = fixture(vec![], 1, Some(tenant()));
        let body = json!({ "payload": {
            "verificationType": "connection",
            "platformId": "web",
            "timestamp": Utc::now().timestamp_millis()
        } });

        let outcome = f.guard.check(with_body(request(), body), GuardProfile::VERIFICATION).await;
        assert!(matches!(
            outcome,
            Outcome::Allow(Admitted {
                verification: Some(VerificationPayload::Connection { .. }),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_missing_tenant_skips_limiter_when_fail_open() {
        let f = fixture(vec![], 99, None);
        let req = Request::builder().method("POST").body(Body::empty()).unwrap();

        assert!(matches!(
            f.guard.check(req, GuardProfile::REFRESH).await,
            Outcome::Allow(_)
        ));
        assert_eq!(f.store.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rate_limited_reply_has_retry_after() {
        let response = GuardError::RateLimited { retry_after_secs: 60 }
            .reply("req-1")
            .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("retry-after").unwrap(), "60");
        assert_eq!(response.headers().get("x-request-id").unwrap(), "req-1");
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }
}
