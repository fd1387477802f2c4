//! Startup orchestration.
//!
//! # Order
//! 1. signing keys (fatal when missing or mismatched)
//! 2. remote client and counting store
//! 3. log store
//! 4. initial cache load (logged, never fatal)
//! 5. listener bind

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::http::{AppState, Dependencies};
use crate::logs::FsLogStore;
use crate::remote::{HttpSecurityClient, RemoteError};
use crate::security::store::{build_store, StoreError};
use crate::signing::{PemFileKeyProvider, Signer, SigningError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("signing keys: {0}")]
    Signing(#[from] SigningError),

    #[error("remote client: {0}")]
    Remote(#[from] RemoteError),

    #[error("counting store: {0}")]
    Store(#[from] StoreError),

    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the production services described by `config`.
pub fn dependencies_from_config(config: &GatewayConfig) -> Result<Dependencies, StartupError> {
    let signer = Signer::from_provider(&PemFileKeyProvider::from_config(&config.signing))?;
    tracing::info!(
        public_key = %config.signing.public_key_path,
        "Response signing keys loaded"
    );

    let remote = HttpSecurityClient::new(&config.remote)?;
    let counting_store = build_store(
        &config.rate_limit.store,
        Duration::from_secs(config.remote.request_timeout_secs),
    )?;

    Ok(Dependencies {
        remote: Arc::new(remote),
        counting_store,
        logs: Arc::new(FsLogStore::new(&config.logs.root)),
        signer: Arc::new(signer),
    })
}

/// Load both caches once so the first requests do not wait on the remote.
pub async fn prime_caches(state: &AppState) {
    let Some(caches) = &state.caches else {
        return;
    };
    match caches.refresh_all().await {
        Ok(()) => tracing::info!("Security state loaded"),
        Err(e) => tracing::warn!(error = %e, "Initial security state load failed, will retry on demand"),
    }
}

/// Bind the listener named in `config`.
pub async fn bind(config: &GatewayConfig) -> Result<TcpListener, StartupError> {
    let addr: SocketAddr = config
        .listener
        .bind_address
        .parse()
        .map_err(|_| StartupError::BindAddress(config.listener.bind_address.clone()))?;
    Ok(TcpListener::bind(addr).await?)
}
