//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Assemble shared state (guard, caches, signer, log store)
//! - Create the Axum Router with all handlers
//! - Wire up middleware (tracing, request metrics, timeout)
//! - Swap in reloaded configuration
//! - Run the background cache refresher
//! - Serve until shutdown

use arc_swap::ArcSwap;
use axum::{
    extract::{MatchedPath, Request},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::cache::SecurityCaches;
use crate::config::GatewayConfig;
use crate::http::handlers;
use crate::http::request::{generate_request_id, X_REQUEST_ID};
use crate::http::response::ErrorReply;
use crate::lifecycle::Shutdown;
use crate::logs::LogStore;
use crate::observability::metrics;
use crate::remote::RemoteSecurityService;
use crate::security::{resolve_tenant, CountingStore, Quota, RateLimiter, RequestGuard};
use crate::signing::Signer;

/// Externally constructed services the gateway runs on.
pub struct Dependencies {
    pub remote: Arc<dyn RemoteSecurityService>,
    pub counting_store: Arc<dyn CountingStore>,
    pub logs: Arc<dyn LogStore>,
    pub signer: Arc<Signer>,
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ArcSwap<GatewayConfig>>,
    pub guard: Arc<RequestGuard>,
    /// `None` when no tenant key is configured.
    pub caches: Option<SecurityCaches>,
    pub signer: Arc<Signer>,
    pub logs: Arc<dyn LogStore>,
}

impl AppState {
    /// Wire the caches, limiter and guard for the configured tenant.
    pub fn new(config: GatewayConfig, deps: Dependencies) -> Self {
        let tenant = resolve_tenant(&config.tenant);
        if tenant.is_none() {
            tracing::warn!(
                env = %config.tenant.key_env,
                "No tenant key configured, privileged routes will be refused"
            );
        }

        let ttl = Duration::from_secs(config.cache.ttl_secs);
        let caches = tenant
            .as_ref()
            .map(|t| SecurityCaches::new(deps.remote.clone(), t.validation_id(), ttl));

        let limiter = RateLimiter::new(
            deps.counting_store,
            caches.as_ref().map(|c| c.policy.clone()),
            Quota::from(&config.rate_limit),
        );

        let config = Arc::new(ArcSwap::from_pointee(config));
        let guard = RequestGuard::new(
            config.clone(),
            tenant,
            limiter,
            caches.as_ref().map(|c| c.banned_ips.clone()),
        );

        Self {
            config,
            guard: Arc::new(guard),
            caches,
            signer: deps.signer,
            logs: deps.logs,
        }
    }

    /// Replace the live configuration.
    pub fn apply_config(&self, config: GatewayConfig) {
        self.config.store(Arc::new(config));
    }
}

/// HTTP server for the log gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(state: AppState) -> Router {
        let request_timeout = Duration::from_secs(state.config.load().timeouts.request_secs);

        Router::new()
            .route("/logger", post(handlers::ingest).get(handlers::read_logs))
            .route(
                "/logger/.well-known",
                post(handlers::verify).get(handlers::well_known),
            )
            .route("/logger/banned", post(handlers::refresh_banned))
            .route("/logger/sync", post(handlers::sync))
            .route("/logger/status", post(handlers::status))
            .route("/health", get(handlers::health))
            .fallback(handlers::not_found)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(middleware::from_fn(track_requests))
                    .layer(middleware::from_fn(stamp_timeouts))
                    .layer(TimeoutLayer::new(request_timeout)),
            )
    }

    /// Serve on `listener` until `shutdown` fires.
    ///
    /// Reloaded configurations arriving on `config_updates` replace the live
    /// settings.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        tokio::spawn(apply_config_updates(
            self.state.clone(),
            config_updates,
            shutdown.clone(),
        ));

        let refresh_secs = self.state.config.load().cache.background_refresh_secs;
        if refresh_secs > 0 {
            if let Some(caches) = &self.state.caches {
                caches.spawn_refresher(Duration::from_secs(refresh_secs), shutdown.subscribe());
            }
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn apply_config_updates(
    state: AppState,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    shutdown: Shutdown,
) {
    let stopped = shutdown.wait();
    tokio::pin!(stopped);

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => {
                    state.apply_config(config);
                    tracing::info!("Live configuration updated");
                }
                None => break,
            },
            _ = &mut stopped => break,
        }
    }
}

/// Give requests cut off by the timeout layer the same error shape and
/// headers as every other denial.
async fn stamp_timeouts(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.status() != StatusCode::REQUEST_TIMEOUT
        || response.headers().contains_key(X_REQUEST_ID)
    {
        return response;
    }

    let request_id = generate_request_id();
    tracing::warn!(request_id = %request_id, "Request timed out");
    ErrorReply::new(StatusCode::REQUEST_TIMEOUT, "Request timed out", &request_id).into_response()
}

async fn track_requests(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    metrics::record_request(&method, &route, response.status().as_u16(), start);
    response
}
