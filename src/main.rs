//! Edge Gateway (v1)
//!
//! A single entry point for client traffic, built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────┐
//!                       │                   EDGE GATEWAY                    │
//!     Client Request    │  ┌─────────┐   ┌───────────┐   ┌──────────────┐  │
//!     ──────────────────┼─▶│  http   │──▶│  routing  │──▶│  resilience  │  │
//!                       │  │ server  │   │ RouteTable│   │   breaker    │  │
//!                       │  └─────────┘   └───────────┘   └──────┬───────┘  │
//!                       │                                       │ open     │
//!                       │                                       ├────────▶ fallback 503
//!                       │                                       ▼          │
//!                       │  ┌──────────────┐   ┌──────────────────────────┐ │
//!                       │  │load_balancer │◀──│  discovery (registry)    │ │
//!                       │  │ round robin  │   └──────────────────────────┘ │
//!                       │  └──────┬───────┘                                │
//!     Client Response   │         ▼                                        │
//!     ◀─────────────────┼── dispatch upstream (deadline) ◀─────────────────┼── Backend
//!                       └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use edge_gateway::config::{load_config, watcher::ConfigWatcher, GatewayConfig};
use edge_gateway::lifecycle::signals::shutdown_on_signal;
use edge_gateway::observability::{logging, metrics};
use edge_gateway::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "edge-gateway")]
#[command(about = "Edge gateway with per-service circuit breaking", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    if args.check {
        println!("configuration OK ({} routes)", config.routes.len());
        return Ok(());
    }

    logging::init_logging(&config.observability);
    tracing::info!("edge-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        routes = config.routes.len(),
        proxy_timeout_ms = config.proxy.timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let initial_routes = config.routes.clone();
    let server = HttpServer::new(config)?;

    let listener = TcpListener::bind(bind_address.as_str()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    // The watcher handle must outlive the server or file events stop.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path, initial_routes);
            match watcher.run() {
                Ok(handle) => (Some(handle), rx),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    (None, rx)
                }
            }
        }
        None => {
            let (_tx, rx) = mpsc::unbounded_channel();
            (None, rx)
        }
    };

    server.run(listener, config_updates, shutdown_rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
