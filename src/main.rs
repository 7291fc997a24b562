//! Memo relay
//!
//! Relay between the memo frontend and its backend API.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                      MEMO RELAY                       │
//!                     │                                                       │
//!   Client Request    │  ┌─────────┐    ┌──────────┐    ┌──────────────┐      │
//!   ──────────────────┼─▶│  http   │───▶│ staging  │───▶│   payload    │      │
//!                     │  │ server  │    │(multipart)│   │   builder    │      │
//!                     │  └────┬────┘    └──────────┘    └──────┬───────┘      │
//!                     │       │                                ▼              │
//!                     │       │ /api/gemini            ┌──────────────┐       │
//!                     │       ▼                        │  dispatcher  │───────┼──▶ Backend API
//!                     │  ┌──────────┐                  └──────┬───────┘       │
//!                     │  │generative│──────────────────┐      │               │
//!                     │  └──────────┘                  │      ▼               │
//!   Client Response   │  ┌──────────┐    ┌──────────┐  │                      │
//!   ◀─────────────────┼──│ response │◀───│ cleanup  │  └──────────────────────┼──▶ AI endpoint
//!                     │  └──────────┘    └──────────┘                         │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;

use tokio::net::TcpListener;

use memo_relay::config::{load_config, ObservabilityConfig};
use memo_relay::lifecycle::{signals, Shutdown};
use memo_relay::observability::{logging, metrics};
use memo_relay::HttpServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging(&ObservabilityConfig::default());
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    logging::init_logging(&config.observability);

    tracing::info!("memo-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address(),
        backend = %config.relay.backend_url,
        upstream_timeout_secs = config.timeouts.upstream_secs,
        client_timeout_secs = config.timeouts.client_secs,
        generative = config.generative.is_configured(),
        "Configuration loaded"
    );
    match serde_json::to_string(&config) {
        Ok(resolved) => tracing::debug!(config = %resolved, "Resolved configuration"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize configuration"),
    }

    if let Some(address) = &config.observability.metrics_address {
        match address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(metrics_address = %address, error = %e, "Failed to parse metrics address"),
        }
    }

    let listener = TcpListener::bind(config.listener.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(&shutdown);

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
