//! Shared server state and router assembly.

use std::{sync::Arc, time::Instant};

use axum::Router;
use browser_relay_session::{RelayManager, now_millis};
use browser_relay_transport::{DispatchTable, create_ws_router};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{api, console};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<RelayManager>,
    pub port: u16,
    pub started_at: Instant,
    /// Startup time (Unix epoch milliseconds).
    pub start_time: i64,
}

impl AppState {
    #[must_use]
    pub fn new(manager: Arc<RelayManager>, port: u16) -> Self {
        Self {
            manager,
            port,
            started_at: Instant::now(),
            start_time: now_millis(),
        }
    }
}

/// Build the full router: `/ws`, `/api/*` and `/console/*`.
pub fn router(state: AppState, dispatch: Arc<DispatchTable>) -> Router {
    Router::new()
        .nest("/api", api::routes())
        .nest("/console", console::routes())
        .with_state(state)
        .merge(create_ws_router(dispatch))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
