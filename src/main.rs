//! Library gateway binary.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──▶ http server ──┬──▶ aggregation ──▶ breakers ──▶ catalog
//!                            │                                reputation
//!                            └──▶ saga ─────────▶ (direct) ──▶ ledger
//!                                  │
//!                                  │ partial failure
//!                                  ▼
//!                             retry queue ◀──▶ dispatcher (background replay)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use library_gateway::config::{self, GatewayConfig};
use library_gateway::lifecycle::signals::shutdown_on_signal;
use library_gateway::observability::{logging, metrics};
use library_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "library-gateway", version, about = "Edge gateway for the library services")]
struct Args {
    /// TOML configuration file; defaults plus environment overrides when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config: GatewayConfig = match &args.config {
        Some(path) => config::load_config(path)?,
        None => config::load_from_env()?,
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "library-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        catalog = %config.services.catalog_url,
        reputation = %config.services.reputation_url,
        ledger = %config.services.ledger_url,
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

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
