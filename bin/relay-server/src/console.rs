//! Operator endpoints.

use axum::{Json, Router, extract::State, routing::get};
use browser_relay_session::ConnectionInfo;
use serde::Serialize;
use serde_json::{Value, json};

use crate::app::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerStatus {
    status: &'static str,
    version: &'static str,
    port: u16,
    start_time: i64,
    uptime_ms: u64,
    uptime_formatted: String,
    active_connections: usize,
    total_messages: u64,
    pending_tasks: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Connections {
    count: usize,
    total_messages: u64,
    connections: Vec<ConnectionInfo>,
}

/// Console routes, mounted under `/console`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/connections", get(connections))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "success", "data": {"status": "ok"}}))
}

async fn status(State(state): State<AppState>) -> Json<ServerStatus> {
    let uptime = state.started_at.elapsed();
    let secs = uptime.as_secs();
    let registry = state.manager.registry();

    Json(ServerStatus {
        status: "success",
        version: env!("CARGO_PKG_VERSION"),
        port: state.port,
        start_time: state.start_time,
        uptime_ms: u64::try_from(uptime.as_millis()).unwrap_or(u64::MAX),
        uptime_formatted: format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60),
        active_connections: registry.active_count(),
        total_messages: registry.total_messages(),
        pending_tasks: state.manager.tasks().pending_count(),
    })
}

async fn connections(State(state): State<AppState>) -> Json<Connections> {
    let registry = state.manager.registry();
    let connections: Vec<ConnectionInfo> =
        registry.list_all().iter().map(|c| c.info()).collect();

    Json(Connections {
        count: connections.len(),
        total_messages: registry.total_messages(),
        connections,
    })
}
