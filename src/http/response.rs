//! Response construction.
//!
//! Every response leaves with the security headers and `X-Request-ID`.
//! Error bodies carry a fixed message and the request id, never internal
//! detail.

use axum::http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::http::request::{RequestContext, X_CORRELATION_ID, X_REQUEST_ID};
use crate::security::headers::apply_security_headers;

/// Client-facing error.
#[derive(Debug, Clone)]
pub struct ErrorReply {
    status: StatusCode,
    message: String,
    request_id: String,
    retry_after_secs: Option<u64>,
}

impl ErrorReply {
    pub fn new(status: StatusCode, message: impl Into<String>, request_id: &str) -> Self {
        Self {
            status,
            message: message.into(),
            request_id: request_id.to_string(),
            retry_after_secs: None,
        }
    }

    pub fn retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ErrorReply {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "error": self.message,
            "requestId": self.request_id,
        });
        let mut response = (self.status, Json(body)).into_response();
        let headers = response.headers_mut();
        apply_security_headers(headers);
        if let Ok(value) = HeaderValue::from_str(&self.request_id) {
            headers.insert(HeaderName::from_static(X_REQUEST_ID), value);
        }
        if let Some(secs) = self.retry_after_secs {
            headers.insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Attach request/correlation ids and the security headers.
pub fn stamp(mut response: Response, context: &RequestContext) -> Response {
    let headers = response.headers_mut();
    apply_security_headers(headers);
    if let Ok(value) = HeaderValue::from_str(&context.request_id) {
        headers.insert(HeaderName::from_static(X_REQUEST_ID), value);
    }
    if let Ok(value) = HeaderValue::from_str(&context.correlation_id) {
        headers.insert(HeaderName::from_static(X_CORRELATION_ID), value);
    }
    response
}

/// JSON success response with ids merged into the body.
pub fn json_reply(status: StatusCode, mut body: Value, context: &RequestContext) -> Response {
    if let Value::Object(map) = &mut body {
        map.insert("requestId".to_string(), Value::from(context.request_id.clone()));
        map.insert(
            "correlationId".to_string(),
            Value::from(context.correlation_id.clone()),
        );
    }
    stamp((status, Json(body)).into_response(), context)
}
