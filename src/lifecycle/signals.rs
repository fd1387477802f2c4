//! OS signal handling.
//!
//! - SIGINT / SIGTERM trigger graceful shutdown
//! - SIGHUP forces a refetch of the banned-IP list and security policy

use tokio::task::JoinHandle;

use crate::cache::SecurityCaches;
use crate::lifecycle::Shutdown;

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn wait_for_termination() {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
        _ = terminate() => {}
    }
}

#[cfg(unix)]
async fn hangups(caches: Option<SecurityCaches>) {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sig = match signal(SignalKind::hangup()) {
        Ok(sig) => sig,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGHUP handler");
            return std::future::pending().await;
        }
    };

    while sig.recv().await.is_some() {
        let Some(caches) = &caches else {
            tracing::info!("SIGHUP received, no tenant configured");
            continue;
        };
        tracing::info!("SIGHUP received, refreshing security state");
        if let Err(e) = caches.force_refresh_all().await {
            tracing::error!(error = %e, "Security state refresh failed");
        }
    }
}

#[cfg(not(unix))]
async fn hangups(_caches: Option<SecurityCaches>) {
    std::future::pending::<()>().await;
}

/// Translate signals into shutdown and refresh actions.
pub fn spawn_signal_handler(shutdown: Shutdown, caches: Option<SecurityCaches>) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_termination() => {
                tracing::info!("Shutdown signal received");
                shutdown.trigger();
            }
            _ = hangups(caches) => {}
        }
    })
}
