//! Envelope dispatch, WebSocket transport and stream bridging.
//!
//! Provides:
//! - Dispatch table routing inbound envelopes to handlers
//! - Stream bridge merging task chunks with heartbeats (SSE: feature `sse`)
//! - WebSocket connection handling (feature: websocket)

pub mod bridge;
pub mod dispatch;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use bridge::{BridgeUnit, ChunkSender, DONE_MARKER, StreamBridge};
pub use dispatch::{
    DispatchError, DispatchTable, DispatchTableBuilder, RegisterHandler, Reply, RouteHandler,
    TaskResponseHandler,
};

#[cfg(feature = "websocket")]
pub use websocket::{WsState, create_ws_router, serve_connection};
