//! Relay server for browser agents.
//!
//! Agents connect over `/ws` and register; callers use `/api/*` to run
//! fetches and scripts inside an agent's pages and `/console/*` to inspect
//! the relay.
//!
//! Usage:
//!   relay-server --port 8080
//!   relay-server --bind 0.0.0.0 --config relay.json
//!
//! # Environment Variables
//!
//! - `RELAY_BIND` - Bind address (default: 127.0.0.1)
//! - `RELAY_PORT` - Port to listen on (default: 8080)
//! - `RELAY_CONFIG` - JSON file with timeouts and intervals
//! - `RUST_LOG` - Log filter (default: info)

mod api;
mod app;
mod console;

use std::{
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use browser_relay_core::RelayConfig;
use browser_relay_session::RelayManager;
use browser_relay_transport::DispatchTable;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;

#[derive(Debug, Parser)]
#[command(name = "relay-server", version, about = "Relay commands to connected browser agents")]
struct Args {
    /// Address to bind.
    #[arg(short, long, env = "RELAY_BIND", default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Port to listen on.
    #[arg(short, long, env = "RELAY_PORT", default_value_t = 8080)]
    port: u16,

    /// JSON file overriding the default timeouts.
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    tracing::debug!(?config, "Loaded relay config");

    let manager = Arc::new(RelayManager::new(config));
    let dispatch = DispatchTable::standard(
        Arc::clone(manager.registry()),
        Arc::clone(manager.tasks()),
    )
    .context("Failed to build dispatch table")?;
    let sweeper = Arc::clone(&manager).spawn_sweeper();

    let app = app::router(
        AppState::new(Arc::clone(&manager), args.port),
        Arc::new(dispatch),
    );

    // Start server
    let addr = SocketAddr::new(args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Relay server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&manager)))
        .await?;

    sweeper.abort();
    tracing::info!("Relay server stopped");
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RelayConfig> {
    let Some(path) = path else {
        return Ok(RelayConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    RelayConfig::from_json(&raw).with_context(|| format!("Invalid config {}", path.display()))
}

/// Resolves on Ctrl-C after closing every agent connection, so open
/// WebSockets do not hold up the graceful shutdown.
async fn shutdown_signal(manager: Arc<RelayManager>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, closing agent connections");
    manager.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["relay-server"]).unwrap();
        assert_eq!(args.bind, IpAddr::from([127, 0, 0, 1]));
        assert_eq!(args.port, 8080);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_missing_config_file_fails() {
        let err = load_config(Some(Path::new("/nonexistent/relay.json"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_config_file_overrides() {
        let path = std::env::temp_dir().join(format!("relay-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"single_timeout_ms": 5000}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.single_timeout_ms, 5_000);
        assert_eq!(config.heartbeat_ms, RelayConfig::default().heartbeat_ms);
    }
}
