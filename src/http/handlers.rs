//! Route handlers.
//!
//! Every handler hands the raw request to [`RequestGuard::check`] with the
//! profile for its route and only continues on [`Outcome::Allow`].
//!
//! [`RequestGuard::check`]: crate::security::RequestGuard::check

use axum::extract::{Query, Request, State};
use axum::http::header::{HeaderName, HeaderValue, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE, VARY};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use crate::http::request::{generate_request_id, RequestContext};
use crate::http::response::{json_reply, stamp, ErrorReply};
use crate::http::server::AppState;
use crate::logs::{DateBucket, LogPage, LogQuery, LogStoreError, LogSystem};
use crate::security::guard::{Admitted, Denial, GuardError, GuardProfile, Outcome};
use crate::security::validation::VerificationPayload;

const X_SIGNATURE_TYPE: &str = "x-signature-type";
const X_VERIFICATION_TIME: &str = "x-verification-time";

async fn admit(state: &AppState, request: Request, profile: GuardProfile) -> Result<Admitted, Response> {
    match state.guard.check(request, profile).await {
        Outcome::Allow(admitted) => Ok(admitted),
        Outcome::Deny(denial) => Err(denial.into_response()),
    }
}

fn error(status: StatusCode, message: &str, context: &RequestContext) -> Response {
    ErrorReply::new(status, message, &context.request_id).into_response()
}

/// Decode an ingested log record.
///
/// The body is either the record itself or `{"logData": "<json text>"}`.
/// The record must be an object; its `id` field is dropped.
pub fn parse_log_record(body: &[u8]) -> Result<Map<String, Value>, &'static str> {
    let value: Value = serde_json::from_slice(body).map_err(|_| "Invalid JSON payload")?;

    let record = match value.get("logData") {
        Some(Value::String(text)) => {
            serde_json::from_str(text).map_err(|_| "Invalid logData format")?
        }
        Some(_) => return Err("Invalid logData format"),
        None => value,
    };

    match record {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        _ => Err("Log data must be a JSON object"),
    }
}

/// `POST /logger`
pub async fn ingest(State(state): State<AppState>, request: Request) -> Response {
    let admitted = match admit(&state, request, GuardProfile::INGEST).await {
        Ok(admitted) => admitted,
        Err(response) => return response,
    };
    let context = &admitted.context;
    let body = admitted.body.unwrap_or_default();

    let record = match parse_log_record(&body) {
        Ok(record) => record,
        Err(message) => return error(StatusCode::BAD_REQUEST, message, context),
    };
    let system = LogSystem::for_record_type(record.get("type").and_then(Value::as_str));

    match state
        .logs
        .append(system, &DateBucket::today(), &Value::Object(record))
        .await
    {
        Ok(()) => {
            tracing::debug!(request_id = %context.request_id, system = %system, "Log record appended");
            json_reply(
                StatusCode::OK,
                json!({ "success": true, "message": "Log data appended successfully" }),
                context,
            )
        }
        Err(e) => {
            tracing::error!(request_id = %context.request_id, error = %e, "Failed to append log record");
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to append log data", context)
        }
    }
}

/// `GET /logger`: one signed, compressed page of a log bucket.
pub async fn read_logs(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    request: Request,
) -> Response {
    let accept_encoding = request
        .headers()
        .get(ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let admitted = match admit(&state, request, GuardProfile::LOG_READ).await {
        Ok(admitted) => admitted,
        Err(response) => return response,
    };
    let context = admitted.context;

    let default_lines = state.config.load().logs.default_lines;
    let query = match LogQuery::from_params(&params, default_lines) {
        Ok(query) => query,
        Err(message) => return error(StatusCode::BAD_REQUEST, message, &context),
    };

    let lines = match state.logs.read(query.system, &query.date).await {
        Ok(lines) => lines,
        Err(LogStoreError::NotFound) => {
            return error(StatusCode::NOT_FOUND, "Log file not found", &context)
        }
        Err(e) => {
            tracing::error!(request_id = %context.request_id, error = %e, "Failed to read log bucket");
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read log file", &context);
        }
    };

    let page = LogPage::select(&lines, &query);
    let payload = page.to_payload(&query, &context.request_id, Utc::now().timestamp_millis());

    // RSA signing and compression are CPU-bound
    let signer = state.signer.clone();
    let signed = tokio::task::spawn_blocking(move || {
        signer.build_signed_response(payload, accept_encoding.as_deref())
    })
    .await;

    let signed = match signed {
        Ok(Ok(signed)) => signed,
        Ok(Err(e)) => {
            tracing::error!(request_id = %context.request_id, error = %e, "Failed to sign log page");
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to sign response", &context);
        }
        Err(e) => {
            tracing::error!(request_id = %context.request_id, error = %e, "Signing task failed");
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to sign response", &context);
        }
    };

    let mut response = (StatusCode::OK, signed.bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(VARY, HeaderValue::from_static("Accept-Encoding"));
    headers.insert(
        HeaderName::from_static(X_SIGNATURE_TYPE),
        HeaderValue::from_static(signed.signature_type),
    );
    if let Some(encoding) = signed.content_encoding.header_value() {
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding));
    }

    tracing::info!(
        request_id = %context.request_id,
        system = %query.system,
        date = %query.date,
        total_lines = page.total_lines,
        "Served signed log page"
    );
    stamp(response, &context)
}

/// `POST /logger/.well-known`: connection and ownership verification.
pub async fn verify(State(state): State<AppState>, request: Request) -> Response {
    let admitted = match admit(&state, request, GuardProfile::VERIFICATION).await {
        Ok(admitted) => admitted,
        Err(response) => return response,
    };
    let context = &admitted.context;

    match admitted.verification {
        Some(VerificationPayload::Connection { platform_id, .. }) => {
            tracing::info!(request_id = %context.request_id, platform_id = ?platform_id, "Connection verified");
            let mut response = json_reply(
                StatusCode::OK,
                json!({ "success": true, "verified": true, "platformId": platform_id }),
                context,
            );
            response.headers_mut().insert(
                HeaderName::from_static(X_VERIFICATION_TIME),
                HeaderValue::from(Utc::now().timestamp_millis()),
            );
            response
        }
        Some(VerificationPayload::Ownership { .. }) => {
            tracing::info!(request_id = %context.request_id, "Ownership verified");
            json_reply(
                StatusCode::OK,
                json!({ "success": true, "verified": true, "ownership": true }),
                context,
            )
        }
        Some(VerificationPayload::Other(payload)) => json_reply(
            StatusCode::OK,
            json!({ "success": true, "received": payload }),
            context,
        ),
        None => error(StatusCode::BAD_REQUEST, "Missing payload", context),
    }
}

/// `GET /logger/.well-known`: public key and version discovery.
pub async fn well_known(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    request: Request,
) -> Response {
    let admitted = match admit(&state, request, GuardProfile::PUBLIC).await {
        Ok(admitted) => admitted,
        Err(response) => return response,
    };
    let context = &admitted.context;

    if params.contains_key("clientversion") {
        return json_reply(
            StatusCode::OK,
            json!({ "version": env!("CARGO_PKG_VERSION") }),
            context,
        );
    }
    if params.contains_key("publickey") || params.contains_key("publicKey") {
        return json_reply(
            StatusCode::OK,
            json!({ "success": true, "publicKey": state.signer.public_key_pem() }),
            context,
        );
    }
    stamp(StatusCode::NO_CONTENT.into_response(), context)
}

/// `POST /logger/banned`: refetch the banned-IP list now.
pub async fn refresh_banned(State(state): State<AppState>, request: Request) -> Response {
    let admitted = match admit(&state, request, GuardProfile::REFRESH).await {
        Ok(admitted) => admitted,
        Err(response) => return response,
    };
    let context = admitted.context;

    let Some(caches) = &state.caches else {
        return Denial {
            error: GuardError::TenantNotConfigured,
            context,
        }
        .into_response();
    };

    match caches.banned_ips.force_refresh().await {
        Ok(()) => json_reply(
            StatusCode::OK,
            json!({
                "success": true,
                "message": "Banned IPs refreshed successfully",
                "count": caches.banned_ips.snapshot().map(|s| s.len()).unwrap_or_default(),
                "timestamp": Utc::now().to_rfc3339(),
            }),
            &context,
        ),
        Err(e) => {
            tracing::error!(request_id = %context.request_id, error = %e, "Banned IP refresh failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to refresh banned IPs", &context)
        }
    }
}

/// `POST /logger/sync`: refetch policy and banned IPs concurrently.
pub async fn sync(State(state): State<AppState>, request: Request) -> Response {
    let admitted = match admit(&state, request, GuardProfile::REFRESH).await {
        Ok(admitted) => admitted,
        Err(response) => return response,
    };
    let context = admitted.context;

    let Some(caches) = &state.caches else {
        return Denial {
            error: GuardError::TenantNotConfigured,
            context,
        }
        .into_response();
    };

    match caches.force_refresh_all().await {
        Ok(()) => json_reply(
            StatusCode::OK,
            json!({
                "success": true,
                "message": "Security settings and banned IPs refreshed successfully",
                "timestamp": Utc::now().to_rfc3339(),
            }),
            &context,
        ),
        Err(e) => {
            tracing::error!(request_id = %context.request_id, error = %e, "Security state sync failed");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to refresh security settings",
                &context,
            )
        }
    }
}

/// `POST /logger/status`: current security policy, loading it if needed.
pub async fn status(State(state): State<AppState>, request: Request) -> Response {
    let admitted = match admit(&state, request, GuardProfile::REFRESH).await {
        Ok(admitted) => admitted,
        Err(response) => return response,
    };
    let context = admitted.context;

    let Some(caches) = &state.caches else {
        return Denial {
            error: GuardError::TenantNotConfigured,
            context,
        }
        .into_response();
    };

    match caches.policy.get().await {
        Ok(policy) => json_reply(
            StatusCode::OK,
            json!({ "success": true, "settings": &*policy }),
            &context,
        ),
        Err(e) => {
            tracing::error!(request_id = %context.request_id, error = %e, "Security policy unavailable");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load security settings",
                &context,
            )
        }
    }
}

/// `GET /health`
pub async fn health() -> Response {
    (StatusCode::OK, axum::Json(json!({ "status": "ok" }))).into_response()
}

/// Unknown routes.
pub async fn not_found() -> Response {
    ErrorReply::new(StatusCode::NOT_FOUND, "Not Found", &generate_request_id()).into_response()
}
