//! WebSocket transport for browser agents.

use std::{fmt::Display, sync::Arc, time::Duration};

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use browser_relay_core::{MessageChannel, Outbound, TaskError};
use futures::{Sink, SinkExt, Stream, StreamExt};
use uuid::Uuid;

use crate::dispatch::{DispatchError, DispatchTable};

/// Time the writer gets to flush queued frames after the read side ends.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// WebSocket handler state.
#[derive(Clone)]
pub struct WsState {
    /// Routes inbound frames.
    pub dispatch: Arc<DispatchTable>,
}

impl WsState {
    /// Create new WebSocket state.
    #[must_use]
    pub const fn new(dispatch: Arc<DispatchTable>) -> Self {
        Self { dispatch }
    }
}

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (sink, stream) = socket.split();
    serve_connection(sink, stream, state.dispatch).await;
}

/// Serve one agent connection until the peer goes away.
///
/// Outbound frames are written in queue order by a dedicated writer task.
/// Frames that fail to route are logged and the connection stays open.
pub async fn serve_connection<W, R, E>(mut sink: W, mut stream: R, dispatch: Arc<DispatchTable>)
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let channel = Arc::new(MessageChannel::new(Uuid::new_v4()));
    let connection = channel.id();
    let mut frames = match channel.subscribe() {
        Ok(frames) => frames,
        Err(e) => {
            tracing::error!(%connection, "Failed to subscribe to channel: {e}");
            return;
        }
    };
    tracing::info!(%connection, "Agent connected");

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = frames.next().await {
            match frame {
                Outbound::Text(text) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        tracing::debug!(%connection, "Failed to write frame: {e}");
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => {
                    tracing::warn!(%connection, "Ignoring non UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!(%connection, "WebSocket error: {e}");
                break;
            }
        };

        if let Err(e) = dispatch.route(&channel, &text).await {
            log_dispatch_error(connection, &e);
        }
    }

    dispatch.registry().unregister(connection);
    channel.close();
    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }
    tracing::info!(%connection, "Agent disconnected");
}

fn log_dispatch_error(connection: Uuid, error: &DispatchError) {
    match error {
        DispatchError::Malformed(_) => tracing::debug!(%connection, "Dropping frame: {error}"),
        DispatchError::MissingType | DispatchError::UnknownCommand(_) => {
            tracing::warn!(%connection, "Dropping frame: {error}");
        }
        DispatchError::Task(TaskError::ProtocolViolation { .. }) => {
            tracing::error!(%connection, "Agent broke task protocol: {error}");
        }
        _ => tracing::error!(%connection, "Failed to handle frame: {error}"),
    }
}

/// Create WebSocket router.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_ws_router(dispatch));
/// ```
#[must_use]
pub fn create_ws_router(dispatch: Arc<DispatchTable>) -> axum::Router {
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(WsState::new(dispatch))
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use browser_relay_core::TaskStore;
    use browser_relay_session::SessionRegistry;
    use futures::channel::mpsc;
    use serde_json::{Value, json};

    use super::*;

    struct Peer {
        inbound: mpsc::UnboundedSender<Result<Message, Infallible>>,
        outbound: mpsc::UnboundedReceiver<Message>,
        server: tokio::task::JoinHandle<()>,
    }

    impl Peer {
        fn send(&self, text: &str) {
            self.inbound
                .unbounded_send(Ok(Message::Text(text.into())))
                .unwrap();
        }

        async fn recv_json(&mut self) -> Value {
            match self.outbound.next().await {
                Some(Message::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    fn connect(dispatch: &Arc<DispatchTable>) -> Peer {
        let (inbound, inbound_rx) = mpsc::unbounded();
        let (outbound_tx, outbound) = mpsc::unbounded();
        let server = tokio::spawn(serve_connection(
            outbound_tx,
            inbound_rx,
            Arc::clone(dispatch),
        ));
        Peer {
            inbound,
            outbound,
            server,
        }
    }

    fn dispatch() -> Arc<DispatchTable> {
        let registry = Arc::new(SessionRegistry::new());
        Arc::new(DispatchTable::standard(registry, Arc::new(TaskStore::new())).unwrap())
    }

    #[tokio::test]
    async fn test_register_and_disconnect() {
        let dispatch = dispatch();
        let mut peer = connect(&dispatch);

        peer.send(r#"{"type":"register","clientId":"c1"}"#);
        let ack = peer.recv_json().await;
        assert_eq!(ack["type"], "register_ack");
        assert_eq!(ack["data"]["clientId"], "c1");
        assert_eq!(dispatch.registry().active_count(), 1);

        drop(peer.inbound);
        peer.server.await.unwrap();

        assert_eq!(dispatch.registry().active_count(), 0);
        assert_eq!(peer.outbound.next().await, Some(Message::Close(None)));
    }

    #[tokio::test]
    async fn test_bad_frames_keep_connection_open() {
        let dispatch = dispatch();
        let mut peer = connect(&dispatch);

        peer.send("garbage");
        peer.send(r#"{"type":"teleport"}"#);
        peer.send(r#"{"type":"ping"}"#);

        assert_eq!(peer.recv_json().await, json!({"type": "pong"}));
    }

    #[tokio::test]
    async fn test_binary_frames_are_routed() {
        let dispatch = dispatch();
        let mut peer = connect(&dispatch);

        let frame = br#"{"type":"register","clientId":"bin"}"#.to_vec();
        peer.inbound
            .unbounded_send(Ok(Message::Binary(frame.into())))
            .unwrap();

        let ack = peer.recv_json().await;
        assert_eq!(ack["data"]["clientId"], "bin");
    }

    #[tokio::test]
    async fn test_close_frame_unregisters() {
        let dispatch = dispatch();
        let mut peer = connect(&dispatch);

        peer.send(r#"{"type":"register","clientId":"c1"}"#);
        peer.recv_json().await;
        peer.inbound
            .unbounded_send(Ok(Message::Close(None)))
            .unwrap();
        peer.server.await.unwrap();

        assert_eq!(dispatch.registry().active_count(), 0);
    }

    #[tokio::test]
    async fn test_commands_reach_registered_agent() {
        let dispatch = dispatch();
        let mut peer = connect(&dispatch);

        peer.send(r#"{"type":"register","clientId":"c1"}"#);
        peer.recv_json().await;

        let agent = dispatch.registry().pick_agent().await.unwrap();
        agent.channel.send(r#"{"type":"fetch-command","taskId":"t1","data":{}}"#);

        let command = peer.recv_json().await;
        assert_eq!(command["type"], "fetch-command");
        assert_eq!(command["taskId"], "t1");
    }
}
