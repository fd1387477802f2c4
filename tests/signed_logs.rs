//! Ingest then read back signed, compressed log pages.

use axum::body::Body;
use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use log_gateway::logs::DateBucket;
use log_gateway::signing::compression::decompress;
use log_gateway::signing::{ContentEncoding, SignedEnvelope};

mod common;
use common::*;

async fn ingest(app: &TestApp, record: serde_json::Value) {
    let mut request = json_request("POST", "/logger", record);
    request
        .headers_mut()
        .insert("authorization", bearer().parse().unwrap());
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["message"],
        "Log data appended successfully"
    );
}

/// Decode a page using its `Content-Encoding`.
async fn decode_page(response: axum::response::Response) -> SignedEnvelope {
    let encoding = ContentEncoding::from_header(
        response
            .headers()
            .get("content-encoding")
            .and_then(|v| v.to_str().ok()),
    );
    let bytes = decompress(encoding, &body_bytes(response).await).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn read_page(app: &TestApp, query: &str, accept_encoding: &str) -> axum::response::Response {
    let request = request("GET", &format!("/logger?{query}"))
        .header("authorization", bearer())
        .header("accept-encoding", accept_encoding)
        .body(Body::empty())
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

#[tokio::test]
async fn test_signed_page_round_trip() {
    let app = app_with_banned(&[]).await;
    ingest(&app, json!({ "id": 1, "type": "request", "path": "/checkout", "status": 500 })).await;
    ingest(&app, json!({ "type": "request", "path": "/cart", "status": 200 })).await;
    ingest(&app, json!({ "logData": "{\"level\":\"error\",\"message\":\"boom\"}" })).await;

    let today = DateBucket::today();
    let response = read_page(&app, &format!("type=request&date={today}"), "gzip, br").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-encoding").unwrap(), "br");
    assert_eq!(response.headers().get("x-signature-type").unwrap(), "RSA-SHA256");
    assert!(response.headers().contains_key("x-correlation-id"));

    let envelope = decode_page(response).await;
    assert!(envelope.success);
    assert!(app.state.signer.verifier().verify_envelope(&envelope));

    let payload = &envelope.payload;
    assert_eq!(payload["totalLines"], 2);
    assert_eq!(payload["type"], "request");
    let content = payload["content"].as_str().unwrap();
    assert!(content.contains("/checkout"));
    assert!(!content.contains("\"id\""));
    assert!(!content.contains("boom"));

    // Tampering breaks the signature
    let mut tampered = envelope.clone();
    tampered.payload["totalLines"] = json!(3);
    assert!(!app.state.signer.verifier().verify_envelope(&tampered));
}

#[tokio::test]
async fn test_gzip_search_and_paging() {
    let app = app_with_banned(&[]).await;
    for i in 0..5 {
        ingest(&app, json!({ "message": format!("Payment failed #{i}") })).await;
    }
    ingest(&app, json!({ "message": "all good" })).await;

    let today = DateBucket::today();
    let query = format!("type=app&date={today}&search=PAYMENT&start=1&lines=2");
    let response = read_page(&app, &query, "gzip").await;
    assert_eq!(response.headers().get("content-encoding").unwrap(), "gzip");

    let envelope = decode_page(response).await;
    assert!(app.state.signer.verifier().verify_envelope(&envelope));

    let payload = &envelope.payload;
    assert_eq!(payload["totalLines"], 5);
    let content = payload["content"].as_str().unwrap();
    assert_eq!(content.lines().count(), 2);
    assert!(content.contains("#1"));
    assert!(content.contains("#2"));
}

#[tokio::test]
async fn test_identity_when_no_encoding_accepted() {
    let app = app_with_banned(&[]).await;
    ingest(&app, json!({ "message": "plain" })).await;

    let response = read_page(&app, &format!("type=app&date={}", DateBucket::today()), "identity").await;
    assert!(response.headers().get("content-encoding").is_none());
    let envelope = decode_page(response).await;
    assert!(app.state.signer.verifier().verify_envelope(&envelope));
}

#[tokio::test]
async fn test_read_errors() {
    let app = app_with_banned(&[]).await;

    let response = read_page(&app, "type=app&date=01012001", "br").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "Log file not found");

    let response = read_page(&app, "type=audit&date=01012001", "br").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid type parameter");

    let response = read_page(&app, "type=app&date=2001-01-01", "br").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Invalid date format. Use MMDDYYYY"
    );
}

#[tokio::test]
async fn test_ingest_rejects_non_object() {
    let app = app_with_banned(&[]).await;
    let mut request = json_request("POST", "/logger", json!([1, 2, 3]));
    request
        .headers_mut()
        .insert("authorization", bearer().parse().unwrap());

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
