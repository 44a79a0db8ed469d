//! Registry of connected browser agents.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use browser_relay_core::{ConnectionId, MessageChannel};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::Notify,
    time::{Instant, timeout_at},
};

/// Default wait for an agent to become available.
pub const DEFAULT_AGENT_WAIT: Duration = Duration::from_secs(10);

/// Default re-sample cadence while waiting for an agent.
pub const DEFAULT_AGENT_POLL: Duration = Duration::from_millis(300);

/// Registry error.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No active clients available after waiting for {0:?}")]
    NoAgentAvailable(Duration),
}

/// A registered agent connection.
#[derive(Debug, Clone)]
pub struct AgentConnection {
    /// Physical connection id; the registry key.
    pub connection_id: ConnectionId,
    /// Logical client id the agent announced.
    pub client_id: String,
    /// Registration timestamp (Unix epoch milliseconds).
    pub connected_at: i64,
    /// Last ping/pong timestamp.
    pub last_heartbeat: i64,
    /// Business messages received on this connection.
    pub message_count: u64,
    /// Whether the agent may be picked for new tasks.
    pub active: bool,
    /// Outbound channel to the agent.
    pub channel: Arc<MessageChannel>,
}

impl AgentConnection {
    /// Serializable view for status listings.
    #[must_use]
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.connection_id.to_string(),
            client_id: self.client_id.clone(),
            messages: self.message_count,
            connected_at: self.connected_at,
            last_ping: self.last_heartbeat,
            active: self.active,
        }
    }
}

/// Connection summary exposed to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: String,
    pub client_id: String,
    pub messages: u64,
    pub connected_at: i64,
    pub last_ping: i64,
    pub active: bool,
}

/// Wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Registry of connected agents, keyed by connection id.
///
/// Re-registering the same client id over a new connection adds a second,
/// independent entry.
pub struct SessionRegistry {
    connections: RwLock<HashMap<ConnectionId, AgentConnection>>,
    registered: Notify,
    total_messages: AtomicU64,
    agent_wait: Duration,
    agent_poll: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Create a registry with the default agent wait.
    #[must_use]
    pub fn new() -> Self {
        Self::with_agent_wait(DEFAULT_AGENT_WAIT, DEFAULT_AGENT_POLL)
    }

    /// Create a registry with a custom agent wait and re-sample cadence.
    #[must_use]
    pub fn with_agent_wait(agent_wait: Duration, agent_poll: Duration) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            registered: Notify::new(),
            total_messages: AtomicU64::new(0),
            agent_wait,
            agent_poll,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, AgentConnection>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, AgentConnection>> {
        self.connections.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `channel`'s connection under `client_id`, replacing any
    /// earlier registration of the same connection. A replaced entry keeps
    /// its connect time and message count.
    pub fn register(&self, client_id: impl Into<String>, channel: Arc<MessageChannel>) {
        let client_id = client_id.into();
        let connection_id = channel.id();
        let now = now_millis();

        let mut entries = self.write();
        let previous = entries.get(&connection_id);
        let replacing = previous.is_some();
        let entry = AgentConnection {
            connection_id,
            client_id: client_id.clone(),
            connected_at: previous.map_or(now, |p| p.connected_at),
            last_heartbeat: now,
            message_count: previous.map_or(0, |p| p.message_count),
            active: true,
            channel,
        };
        entries.insert(connection_id, entry);
        drop(entries);

        if replacing {
            tracing::warn!(%connection_id, client_id, "Connection already registered, replacing");
        } else {
            tracing::info!(%connection_id, client_id, "Registered agent");
        }
        self.registered.notify_waiters();
    }

    /// Remove a connection and close its channel. No-op if unknown.
    pub fn unregister(&self, connection_id: ConnectionId) {
        let removed = self.write().remove(&connection_id);
        if let Some(entry) = removed {
            if entry.channel.is_open() {
                entry.channel.close();
            }
            tracing::info!(%connection_id, client_id = entry.client_id, "Unregistered agent");
        }
    }

    /// Snapshot of the active connections.
    #[must_use]
    pub fn list_active(&self) -> Vec<AgentConnection> {
        self.read().values().filter(|c| c.active).cloned().collect()
    }

    /// Snapshot of every registered connection.
    #[must_use]
    pub fn list_all(&self) -> Vec<AgentConnection> {
        self.read().values().cloned().collect()
    }

    /// Snapshot of one connection.
    #[must_use]
    pub fn get(&self, connection_id: ConnectionId) -> Option<AgentConnection> {
        self.read().get(&connection_id).cloned()
    }

    /// Number of active connections.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.read().values().filter(|c| c.active).count()
    }

    /// Count a business message received on a connection.
    pub fn record_message(&self, connection_id: ConnectionId) {
        if let Some(entry) = self.write().get_mut(&connection_id) {
            entry.message_count += 1;
        }
    }

    /// Stamp a ping/pong on a connection.
    pub fn record_heartbeat(&self, connection_id: ConnectionId) {
        if let Some(entry) = self.write().get_mut(&connection_id) {
            entry.last_heartbeat = now_millis();
        }
    }

    /// Count a business message relay-wide; returns the new total.
    pub fn increment_total_messages(&self) -> u64 {
        self.total_messages.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Business messages received since startup.
    #[must_use]
    pub fn total_messages(&self) -> u64 {
        self.total_messages.load(Ordering::Relaxed)
    }

    /// Pick an active agent uniformly at random, waiting up to the
    /// registry's agent wait for one to register.
    ///
    /// # Errors
    /// Returns `NoAgentAvailable` if none shows up in time.
    pub async fn pick_agent(&self) -> Result<AgentConnection, RegistryError> {
        self.pick_agent_within(self.agent_wait, self.agent_poll).await
    }

    /// Pick an active agent uniformly at random.
    ///
    /// Registrations wake the wait; the active set is re-sampled at least
    /// every `poll_interval` regardless.
    ///
    /// # Errors
    /// Returns `NoAgentAvailable` if none shows up within `max_wait`.
    pub async fn pick_agent_within(
        &self,
        max_wait: Duration,
        poll_interval: Duration,
    ) -> Result<AgentConnection, RegistryError> {
        let deadline = Instant::now() + max_wait;
        loop {
            let registered = self.registered.notified();
            tokio::pin!(registered);
            registered.as_mut().enable();

            let mut active = self.list_active();
            if !active.is_empty() {
                let index = rand::rng().random_range(0..active.len());
                return Ok(active.swap_remove(index));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RegistryError::NoAgentAvailable(max_wait));
            }
            let _ = timeout_at((now + poll_interval).min(deadline), registered).await;
        }
    }

    /// Pick an agent and hand it to `callback`.
    ///
    /// # Errors
    /// Returns `NoAgentAvailable` if no agent shows up in time.
    pub async fn pick_agent_and_run<F, Fut, T>(&self, callback: F) -> Result<T, RegistryError>
    where
        F: FnOnce(AgentConnection) -> Fut,
        Fut: Future<Output = T>,
    {
        let agent = self.pick_agent().await?;
        Ok(callback(agent).await)
    }

    /// Unregister every connection, closing its channel.
    pub fn shutdown(&self) {
        let drained: Vec<AgentConnection> = self.write().drain().map(|(_, c)| c).collect();
        for entry in &drained {
            entry.channel.close();
        }
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Closed remaining agent connections");
        }
    }
}
