//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{request::Builder, Request};
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use log_gateway::config::GatewayConfig;
use log_gateway::logs::FsLogStore;
use log_gateway::remote::HttpSecurityClient;
use log_gateway::security::MemoryCountingStore;
use log_gateway::signing::{PemKeyProvider, Signer};
use log_gateway::{AppState, Dependencies, HttpServer};

pub const PRIVATE_PEM: &str = include_str!("../fixtures/private.pem");
pub const PUBLIC_PEM: &str = include_str!("../fixtures/public.pem");

pub const VALIDATION_ID: &str = "abc123";
pub const CLIENT_IP: &str = "198.51.100.7";

pub fn tenant_key() -> String {
    STANDARD.encode(format!("{VALIDATION_ID}:logs.example.com"))
}

pub fn bearer() -> String {
    format!("Bearer {VALIDATION_ID}")
}

/// Serve a banned-IP list and a policy for the test tenant.
pub async fn mount_remote(server: &MockServer, banned: &[&str], requests: u32, duration: &str) {
    let blocked: Vec<Value> = banned
        .iter()
        .enumerate()
        .map(|(i, ip)| json!({ "id": i, "ip": ip }))
        .collect();

    Mock::given(method("GET"))
        .and(path("/api/blockedips"))
        .and(query_param("vid", VALIDATION_ID))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "blockedIps": blocked })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/entities"))
        .and(query_param("where[validationId][equals]", VALIDATION_ID))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "docs": [{
                "requestsPerDuration": requests,
                "duration": duration,
                "securityPolicy": "moderate"
            }]
        })))
        .mount(server)
        .await;
}

/// Configuration pointing at `remote` with fast retries.
pub fn test_config(remote: &MockServer) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.tenant.key = Some(tenant_key());
    config.tenant.key_env = "LOG_GATEWAY_TEST_UNSET_KEY".to_string();
    config.remote.base_url = remote.uri();
    config.remote.base_delay_ms = 1;
    config.remote.max_delay_ms = 5;
    config.remote.default_retry_after_secs = 0;
    config
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub remote: MockServer,
    pub logs_dir: TempDir,
}

pub fn build_app(config: GatewayConfig, remote: MockServer) -> TestApp {
    let logs_dir = tempfile::tempdir().unwrap();
    let signer = Signer::from_provider(&PemKeyProvider::new(PRIVATE_PEM, PUBLIC_PEM)).unwrap();

    let deps = Dependencies {
        remote: Arc::new(HttpSecurityClient::new(&config.remote).unwrap()),
        counting_store: Arc::new(MemoryCountingStore::new()),
        logs: Arc::new(FsLogStore::new(logs_dir.path())),
        signer: Arc::new(signer),
    };
    let state = AppState::new(config, deps);
    let router = HttpServer::build_router(state.clone());

    TestApp {
        router,
        state,
        remote,
        logs_dir,
    }
}

/// Gateway with a reachable remote serving `banned` and a generous policy.
pub async fn app_with_banned(banned: &[&str]) -> TestApp {
    let remote = MockServer::start().await;
    mount_remote(&remote, banned, 100, "1m").await;
    let config = test_config(&remote);
    build_app(config, remote)
}

/// Request arriving through an HTTPS-terminating proxy from [`CLIENT_IP`].
pub fn request(method: &str, uri: &str) -> Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-proto", "https")
        .header("x-forwarded-for", CLIENT_IP)
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    let bytes = serde_json::to_vec(&body).unwrap();
    request(method, uri)
        .header("content-type", "application/json")
        .header("content-length", bytes.len().to_string())
        .body(Body::from(bytes))
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
