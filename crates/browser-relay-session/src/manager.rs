//! Relay manager for sending commands to agents and awaiting results.

use std::sync::Arc;

use browser_relay_core::{
    Envelope, FetchCommand, LOAD_HTML_TASK, RelayConfig, ScriptCommand, TaskError, TaskStore,
};
use serde_json::Value;
use uuid::Uuid;

use crate::registry::{AgentConnection, RegistryError, SessionRegistry};

/// Relay manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Task error: {0}")]
    Task(#[from] TaskError),
}

/// Command a caller asks an agent to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentCommand {
    /// Fetch from inside a page.
    Fetch(FetchCommand),
    /// Run a script inside a page.
    Script(ScriptCommand),
}

impl AgentCommand {
    /// Script command that loads the page HTML.
    #[must_use]
    pub fn load_html(mut command: ScriptCommand) -> Self {
        command.kind = LOAD_HTML_TASK.to_string();
        Self::Script(command)
    }

    /// Fresh task id for this kind of command.
    #[must_use]
    pub fn new_task_id(&self) -> String {
        let prefix = match self {
            Self::Fetch(_) => "task-",
            Self::Script(_) => "task-js-",
        };
        format!("{prefix}{}", Uuid::new_v4().simple())
    }

    /// Wrap the command in its wire envelope.
    #[must_use]
    pub fn into_envelope(self, task_id: String) -> Envelope {
        match self {
            Self::Fetch(data) => Envelope::Fetch { task_id, data },
            Self::Script(data) => Envelope::Script { task_id, data },
        }
    }
}

/// Sends commands to agents and correlates their replies.
pub struct RelayManager {
    registry: Arc<SessionRegistry>,
    tasks: Arc<TaskStore>,
    config: RelayConfig,
}

impl RelayManager {
    /// Create a manager with its own registry and task store.
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        let registry = SessionRegistry::with_agent_wait(config.agent_wait(), config.agent_poll());
        Self::with_parts(Arc::new(registry), Arc::new(TaskStore::new()), config)
    }

    /// Create a manager over an existing registry and task store.
    #[must_use]
    pub const fn with_parts(
        registry: Arc<SessionRegistry>,
        tasks: Arc<TaskStore>,
        config: RelayConfig,
    ) -> Self {
        Self {
            registry,
            tasks,
            config,
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn tasks(&self) -> &Arc<TaskStore> {
        &self.tasks
    }

    #[must_use]
    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Execute a command on a random agent and wait for its single result.
    ///
    /// # Errors
    /// Returns error if no agent is available or the result times out.
    pub async fn execute(&self, command: AgentCommand) -> Result<Value, ManagerError> {
        let command = match command {
            AgentCommand::Fetch(fetch) => AgentCommand::Fetch(FetchCommand {
                stream: false,
                ..fetch
            }),
            script @ AgentCommand::Script(_) => script,
        };
        let task_id = command.new_task_id();
        let envelope = command.into_envelope(task_id.clone());
        let timeout = self.config.single_timeout();

        let result = self
            .registry
            .pick_agent_and_run(|agent| async move {
                dispatch(&agent, &envelope);
                self.tasks.await_single(&task_id, timeout).await
            })
            .await??;
        Ok(result)
    }

    /// Execute a fetch in streaming mode, handing each chunk to `on_chunk`.
    ///
    /// # Errors
    /// Returns error if no agent is available or a stream deadline passes.
    pub async fn execute_stream<F>(
        &self,
        command: FetchCommand,
        on_chunk: F,
    ) -> Result<(), ManagerError>
    where
        F: FnMut(Value) + Send,
    {
        let command = AgentCommand::Fetch(FetchCommand {
            stream: true,
            ..command
        });
        let task_id = command.new_task_id();
        let envelope = command.into_envelope(task_id.clone());
        let start = self.config.stream_start_timeout();
        let completion = self.config.stream_completion_timeout();

        tracing::debug!(task_id, "Starting stream");
        self.registry
            .pick_agent_and_run(|agent| async move {
                dispatch(&agent, &envelope);
                self.tasks
                    .await_stream(&task_id, start, completion, on_chunk)
                    .await
            })
            .await??;
        Ok(())
    }

    /// Drop task records nobody is waiting on once they pass the orphan TTL.
    pub fn sweep(&self) -> usize {
        let dropped = self.tasks.sweep(self.config.orphan_ttl());
        if dropped > 0 {
            tracing::debug!(dropped, "Swept orphaned task records");
        }
        dropped
    }

    /// Periodically sweep the task store.
    pub fn spawn_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.sweep_interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.sweep();
            }
        })
    }

    /// Close every agent connection.
    pub fn shutdown(&self) {
        self.registry.shutdown();
    }
}

/// Queue an envelope for an agent. Delivery failures are logged; the
/// caller's wait times out on its own.
fn dispatch(agent: &AgentConnection, envelope: &Envelope) {
    match agent.channel.send_envelope(envelope) {
        Ok(()) => tracing::debug!(
            connection = %agent.connection_id,
            client_id = agent.client_id,
            task_id = envelope.task_id(),
            "Dispatched {}",
            envelope.route()
        ),
        Err(e) => tracing::error!(
            connection = %agent.connection_id,
            task_id = envelope.task_id(),
            "Failed to dispatch {}: {e}",
            envelope.route()
        ),
    }
}
