//! HTTP client for the security-policy service.
//!
//! # Responsibilities
//! - Build authenticated lookups for the tenant's banned IPs and policy
//! - Apply the bounded retry policy to every call
//! - Decode JSON bodies into wire types

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use std::time::Duration;
use url::Url;

use crate::config::RemoteConfig;
use crate::remote::types::{BannedIpsDocument, PolicyResponse, RemoteError};
use crate::remote::RemoteSecurityService;
use crate::resilience::retries::parse_retry_after;
use crate::resilience::{Attempt, FailureCause, RetryPolicy};
use crate::security::policy::SecurityPolicy;

/// reqwest-backed [`RemoteSecurityService`].
#[derive(Clone)]
pub struct HttpSecurityClient {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl HttpSecurityClient {
    /// Create a client from configuration.
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            RemoteError::InvalidResponse(format!("invalid base URL '{}': {}", config.base_url, e))
        })?;

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RemoteError::InvalidResponse(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            retry: RetryPolicy::from(config),
        })
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, RemoteError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| RemoteError::InvalidResponse(format!("invalid endpoint {path}: {e}")))?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    /// GET `url`, retrying per the configured policy.
    pub async fn fetch_with_retry(&self, url: &Url) -> Result<reqwest::Response, RemoteError> {
        let http = &self.http;

        let response = self
            .retry
            .run(move || async move {
                let result = http
                    .get(url.clone())
                    .header(CONTENT_TYPE, "application/json")
                    .send()
                    .await;

                match result {
                    Ok(resp) if resp.status().is_success() => Attempt::Success(resp),
                    Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                        let retry_after = resp
                            .headers()
                            .get(RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(parse_retry_after);
                        Attempt::Throttled { retry_after }
                    }
                    Ok(resp) => Attempt::Failed(FailureCause::Status(resp.status().as_u16())),
                    Err(e) => Attempt::Failed(FailureCause::Transport(e.to_string())),
                }
            })
            .await;

        response.map_err(|exhausted| {
            tracing::error!(
                path = %url.path(),
                attempts = exhausted.attempts,
                last = %exhausted.last,
                "Remote security service unavailable"
            );
            RemoteError::from(exhausted)
        })
    }
}

#[async_trait]
impl RemoteSecurityService for HttpSecurityClient {
    async fn fetch_banned_ips(&self, tenant_id: &str) -> Result<BannedIpsDocument, RemoteError> {
        let url = self.endpoint("/api/blockedips", &[("vid", tenant_id)])?;
        let response = self.fetch_with_retry(&url).await?;
        response
            .json::<BannedIpsDocument>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    async fn fetch_policy(&self, tenant_id: &str) -> Result<SecurityPolicy, RemoteError> {
        let url = self.endpoint(
            "/api/entities",
            &[("where[validationId][equals]", tenant_id)],
        )?;
        let response = self.fetch_with_retry(&url).await?;
        let body = response
            .json::<PolicyResponse>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        body.into_document()?.into_policy(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_client(server: &MockServer) -> HttpSecurityClient {
        let config = RemoteConfig {
            base_url: server.uri(),
            base_delay_ms: 5,
            max_delay_ms: 20,
            default_retry_after_secs: 0,
            ..RemoteConfig::default()
        };
        HttpSecurityClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_banned_ips() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/blockedips"))
            .and(query_param("vid", "abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "blockedIps": [{ "id": "1", "ip": "10.0.0.1" }, { "id": 2, "ip": " 10.0.0.2 " }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let doc = fast_client(&server).fetch_banned_ips("abc123").await.unwrap();
        let ips: Vec<_> = doc.blocked_ips.iter().map(|b| b.ip.as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.1", " 10.0.0.2 "]);
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(path("/api/entities"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(path("/api/entities"))
            .and(query_param("where[validationId][equals]", "abc123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "docs": [{ "requestsPerDuration": 9, "duration": "1s" }] })),
            )
            .mount(&server)
            .await;

        let policy = fast_client(&server).fetch_policy("abc123").await.unwrap();
        assert_eq!(policy.requests_per_duration, 9);
        assert_eq!(policy.window_ms, 1000);
    }

    #[tokio::test]
    async fn test_gives_up_with_last_status() {
        let server = MockServer::start().await;
        Mock::given(path("/api/blockedips"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = fast_client(&server).fetch_banned_ips("abc123").await.unwrap_err();
        assert_eq!(err.last_status(), Some(500));
    }

    #[tokio::test]
    async fn test_honours_retry_after_on_429() {
        let server = MockServer::start().await;
        Mock::given(path("/api/blockedips"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(path("/api/blockedips"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "blockedIps": [] })))
            .mount(&server)
            .await;

        // Three throttled responses fit the separate 429 budget
        let doc = fast_client(&server).fetch_banned_ips("abc123").await.unwrap();
        assert!(doc.blocked_ips.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(path("/api/blockedips"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = fast_client(&server).fetch_banned_ips("abc123").await.unwrap_err();
        assert!(matches!(err, RemoteError::InvalidResponse(_)));
    }
}
