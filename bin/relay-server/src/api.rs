//! Caller-facing relay endpoints.

use std::{convert::Infallible, sync::Arc};

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::post,
};
use browser_relay_core::{FetchCommand, ScriptCommand};
use browser_relay_session::{AgentCommand, ManagerError, RegistryError, now_millis};
use browser_relay_transport::StreamBridge;
use futures::Stream;
use serde_json::{Value, json};
use thiserror::Error;

use crate::app::AppState;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// No agent connected within the wait.
    #[error("{0}")]
    NoAgent(String),
    /// The agent did not answer in time.
    #[error("{0}")]
    Timeout(String),
    /// The agent answered in a way the relay cannot use.
    #[error("{0}")]
    BadGateway(String),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::NoAgent(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        let message = err.to_string();
        match err {
            ManagerError::Registry(RegistryError::NoAgentAvailable(_)) => Self::NoAgent(message),
            ManagerError::Task(e) if e.is_timeout() => Self::Timeout(message),
            ManagerError::Task(_) => Self::BadGateway(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(%status, "Relay request failed: {self}");
        let body = Json(json!({
            "status": "error",
            "message": self.to_string(),
            "timestamp": now_millis(),
        }));
        (status, body).into_response()
    }
}

/// Relay routes, mounted under `/api`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/remote-fetch", post(remote_fetch))
        .route("/remote-fetch-stream", post(remote_fetch_stream))
        .route("/remote-script", post(remote_script))
        .route("/remote-html", post(remote_html))
}

/// Agent results are passed through: strings raw, anything else as JSON.
fn raw_result(value: Value) -> Response {
    match value {
        Value::String(text) => ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response(),
        other => Json(other).into_response(),
    }
}

async fn remote_fetch(
    State(state): State<AppState>,
    Json(command): Json<FetchCommand>,
) -> Result<Response, ApiError> {
    let value = state.manager.execute(AgentCommand::Fetch(command)).await?;
    Ok(raw_result(value))
}

async fn remote_fetch_stream(
    State(state): State<AppState>,
    Json(command): Json<FetchCommand>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!(fetch_url = command.fetch_url, "Starting SSE stream");
    Sse::new(StreamBridge::fetch(Arc::clone(&state.manager), command).into_sse())
}

async fn remote_script(
    State(state): State<AppState>,
    Json(command): Json<ScriptCommand>,
) -> Result<Response, ApiError> {
    let value = state.manager.execute(AgentCommand::Script(command)).await?;
    Ok(raw_result(value))
}

async fn remote_html(
    State(state): State<AppState>,
    Json(command): Json<ScriptCommand>,
) -> Result<Response, ApiError> {
    let value = state
        .manager
        .execute(AgentCommand::load_html(command))
        .await?;
    Ok(raw_result(value))
}
