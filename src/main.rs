//! Log gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                     LOG GATEWAY                      │
//!                 │                                                      │
//!  Client ───────▶│  http server ──▶ RequestGuard ──▶ handlers           │
//!                 │                    │    │            │               │
//!                 │          RateLimiter    │      logs / signing        │
//!                 │              │          │                            │
//!                 │       CountingStore  BannedIpCache, PolicyCache      │
//!                 │                          │                           │
//!                 │                   RemoteSecurityService ────────────┼──▶ Policy service
//!                 │                                                      │
//!                 │  config (hot reload) · observability · lifecycle     │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use log_gateway::config::{load_or_default, watcher::ConfigWatcher};
use log_gateway::lifecycle::{self, Shutdown};
use log_gateway::observability::{logging, metrics};
use log_gateway::{AppState, HttpServer};

#[derive(Parser)]
#[command(name = "log-gateway")]
#[command(about = "Log gateway with cached remote security state", long_about = None)]
struct Args {
    /// Configuration file (falls back to $GATEWAY_CONFIG, then defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address
    #[arg(long)]
    bind: Option<String>,

    /// Watch the configuration file and apply changes
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_or_default(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "log-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        remote = %config.remote.base_url,
        cache_ttl_secs = config.cache.ttl_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let deps = match lifecycle::dependencies_from_config(&config) {
        Ok(deps) => deps,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return Err(e.into());
        }
    };

    let listener = lifecycle::bind(&config).await?;
    let state = AppState::new(config, deps);
    lifecycle::prime_caches(&state).await;

    // Keep the watcher alive for the life of the server
    let (_watcher, config_updates) = match args.config.as_deref().filter(|_| args.watch) {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => (None, tokio::sync::mpsc::unbounded_channel().1),
    };

    let shutdown = Shutdown::new();
    lifecycle::spawn_signal_handler(shutdown.clone(), state.caches.clone());

    HttpServer::new(state)
        .run(listener, config_updates, shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
