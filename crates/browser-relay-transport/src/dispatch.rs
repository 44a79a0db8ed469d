//! Routing of inbound agent envelopes to handlers.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use browser_relay_core::{ChannelError, Envelope, MessageChannel, ResultKind, TaskError, TaskStore};
use browser_relay_session::SessionRegistry;
use serde_json::Value;
use thiserror::Error;

/// Dispatch error.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Malformed message: {0}")]
    Malformed(String),
    #[error("Message does not contain 'type' field")]
    MissingType,
    #[error("No handler found for type: {0}")]
    UnknownCommand(String),
    #[error("Duplicate route: {0}")]
    DuplicateRoute(String),
    #[error("Route is reserved or empty: {0:?}")]
    InvalidRoute(String),
    #[error("Handler for {route} cannot handle {found}")]
    UnexpectedEnvelope { route: String, found: &'static str },
    #[error("Task error: {0}")]
    Task(#[from] TaskError),
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// What a handler wants sent back to the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Nothing.
    None,
    /// Sent verbatim.
    Text(String),
    /// Serialized, then sent.
    Json(Value),
}

impl Reply {
    /// Reply with an envelope.
    ///
    /// # Errors
    /// Returns error if the envelope cannot be serialized.
    pub fn envelope(envelope: &Envelope) -> Result<Self, DispatchError> {
        serde_json::to_value(envelope)
            .map(Self::Json)
            .map_err(|e| DispatchError::Channel(ChannelError::Serialize(e)))
    }
}

/// Handler for one envelope type.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    /// Handle an envelope received on `channel`.
    async fn handle(
        &self,
        channel: &Arc<MessageChannel>,
        envelope: Envelope,
    ) -> Result<Reply, DispatchError>;
}

/// Binds a connection to the client id it announces.
pub struct RegisterHandler {
    registry: Arc<SessionRegistry>,
}

impl RegisterHandler {
    #[must_use]
    pub const fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl RouteHandler for RegisterHandler {
    async fn handle(
        &self,
        channel: &Arc<MessageChannel>,
        envelope: Envelope,
    ) -> Result<Reply, DispatchError> {
        let Envelope::Register { client_id } = envelope else {
            return Err(DispatchError::UnexpectedEnvelope {
                route: "register".into(),
                found: envelope.route(),
            });
        };
        self.registry.register(client_id.clone(), Arc::clone(channel));
        Reply::envelope(&Envelope::register_ack(client_id))
    }
}

/// Feeds agent results into the task store.
pub struct TaskResponseHandler {
    tasks: Arc<TaskStore>,
}

impl TaskResponseHandler {
    #[must_use]
    pub const fn new(tasks: Arc<TaskStore>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl RouteHandler for TaskResponseHandler {
    async fn handle(
        &self,
        _channel: &Arc<MessageChannel>,
        envelope: Envelope,
    ) -> Result<Reply, DispatchError> {
        let Envelope::TaskResponse { task_id, data } = envelope else {
            return Err(DispatchError::UnexpectedEnvelope {
                route: "task-response".into(),
                found: envelope.route(),
            });
        };
        match data.kind {
            ResultKind::Stream => self.tasks.append_chunk(&task_id, data.data)?,
            ResultKind::Single => self.tasks.complete_single(&task_id, data.data)?,
        }
        Ok(Reply::None)
    }
}

/// Collects routes before the table is sealed.
pub struct DispatchTableBuilder {
    registry: Arc<SessionRegistry>,
    routes: Vec<(String, Arc<dyn RouteHandler>)>,
}

impl DispatchTableBuilder {
    /// Add a route.
    #[must_use]
    pub fn route(mut self, route: impl Into<String>, handler: impl RouteHandler + 'static) -> Self {
        self.routes.push((route.into(), Arc::new(handler)));
        self
    }

    /// Seal the table.
    ///
    /// # Errors
    /// Returns error if a route is registered twice, is empty, or shadows
    /// the keepalive types.
    pub fn build(self) -> Result<DispatchTable, DispatchError> {
        let mut routes = HashMap::with_capacity(self.routes.len());
        for (route, handler) in self.routes {
            if route.is_empty() || route == "ping" || route == "pong" {
                return Err(DispatchError::InvalidRoute(route));
            }
            if routes.contains_key(&route) {
                return Err(DispatchError::DuplicateRoute(route));
            }
            tracing::info!("Registered route: {route}");
            routes.insert(route, handler);
        }
        Ok(DispatchTable {
            registry: self.registry,
            routes,
        })
    }
}

/// Routes inbound frames by their `type` field.
///
/// `ping` is answered directly and never reaches a handler.
pub struct DispatchTable {
    registry: Arc<SessionRegistry>,
    routes: HashMap<String, Arc<dyn RouteHandler>>,
}

impl DispatchTable {
    /// Start an empty table.
    #[must_use]
    pub const fn builder(registry: Arc<SessionRegistry>) -> DispatchTableBuilder {
        DispatchTableBuilder {
            registry,
            routes: Vec::new(),
        }
    }

    /// Table with the `register` and `task-response` routes.
    ///
    /// # Errors
    /// Returns error if the table cannot be built.
    pub fn standard(
        registry: Arc<SessionRegistry>,
        tasks: Arc<TaskStore>,
    ) -> Result<Self, DispatchError> {
        Self::builder(Arc::clone(&registry))
            .route("register", RegisterHandler::new(registry))
            .route("task-response", TaskResponseHandler::new(tasks))
            .build()
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Registered routes, sorted.
    #[must_use]
    pub fn routes(&self) -> Vec<&str> {
        let mut routes: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        routes.sort_unstable();
        routes
    }

    /// Route one inbound text frame received on `channel`.
    ///
    /// # Errors
    /// Returns error if the frame is malformed, untyped or unroutable, or
    /// its handler fails. None of these should close the connection.
    pub async fn route(&self, channel: &Arc<MessageChannel>, frame: &str) -> Result<(), DispatchError> {
        let value: Value =
            serde_json::from_str(frame).map_err(|e| DispatchError::Malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(DispatchError::Malformed("expected a JSON object".into()));
        }
        let route = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(DispatchError::MissingType)?
            .to_string();

        match route.as_str() {
            "ping" => {
                self.registry.record_heartbeat(channel.id());
                channel.send_envelope(&Envelope::Pong)?;
                return Ok(());
            }
            "pong" => {
                self.registry.record_heartbeat(channel.id());
                return Ok(());
            }
            _ => {}
        }

        let handler = self
            .routes
            .get(&route)
            .ok_or_else(|| DispatchError::UnknownCommand(route.clone()))?;
        let envelope: Envelope =
            serde_json::from_value(value).map_err(|e| DispatchError::Malformed(e.to_string()))?;
        tracing::debug!(connection = %channel.id(), "Routing {route}");

        self.registry.increment_total_messages();
        let reply = handler.handle(channel, envelope).await;
        // After the handler, so a `register` frame counts for its own entry.
        self.registry.record_message(channel.id());

        match reply? {
            Reply::None => {}
            Reply::Text(text) => channel.send(text),
            Reply::Json(json) => channel.send(json.to_string()),
        }
        Ok(())
    }
}
