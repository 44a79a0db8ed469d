//! Wire envelope exchanged with browser agents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chunk value an agent sends to close a streamed result.
pub const STREAM_SENTINEL: &str = "[!!DONE!!]";

/// Script task type executed when the caller does not pick one.
pub const SCRIPT_TASK: &str = "EXECUTE_SCRIPT_TASK";

/// Script task type that loads the page HTML.
pub const LOAD_HTML_TASK: &str = "LOAD_HTML";

/// Envelope exchanged over an agent connection.
///
/// The `type` field selects the variant; anything outside this set is
/// rejected at decode time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// Ask the agent to perform a fetch from inside a page.
    #[serde(rename = "fetch-command")]
    Fetch {
        #[serde(rename = "taskId")]
        task_id: String,
        data: FetchCommand,
    },
    /// Ask the agent to run a script inside a page.
    #[serde(rename = "execute-script")]
    Script {
        #[serde(rename = "taskId")]
        task_id: String,
        data: ScriptCommand,
    },
    /// Agent announces itself.
    #[serde(rename = "register")]
    Register {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    /// Acknowledges a `register`.
    #[serde(rename = "register_ack")]
    RegisterAck { status: String, data: RegisterAck },
    /// Agent reports a result (or one chunk of it) for a task.
    #[serde(rename = "task-response")]
    TaskResponse {
        #[serde(rename = "taskId")]
        task_id: String,
        data: TaskPayload,
    },
    /// Keepalive request.
    #[serde(rename = "ping")]
    Ping,
    /// Keepalive reply.
    #[serde(rename = "pong")]
    Pong,
}

impl Envelope {
    /// Build the acknowledgment for a registered client.
    #[must_use]
    pub fn register_ack(client_id: impl Into<String>) -> Self {
        Self::RegisterAck {
            status: "success".to_string(),
            data: RegisterAck {
                client_id: client_id.into(),
            },
        }
    }

    /// Wire value of the `type` discriminator.
    #[must_use]
    pub const fn route(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch-command",
            Self::Script { .. } => "execute-script",
            Self::Register { .. } => "register",
            Self::RegisterAck { .. } => "register_ack",
            Self::TaskResponse { .. } => "task-response",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }

    /// Task id carried by command and response envelopes.
    #[must_use]
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Fetch { task_id, .. }
            | Self::Script { task_id, .. }
            | Self::TaskResponse { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

/// Payload of a `register_ack`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterAck {
    #[serde(rename = "clientId")]
    pub client_id: String,
}

/// Fetch performed by the agent from the context of `page_url`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchCommand {
    /// Page the request is issued from.
    #[serde(default)]
    pub page_url: String,
    /// Target of the request.
    #[serde(default)]
    pub fetch_url: String,
    /// HTTP method, e.g. `GET` or `POST`.
    #[serde(default)]
    pub method: Option<String>,
    /// Request body, passed through untouched.
    #[serde(default)]
    pub body: Value,
    /// Whether the agent should answer with chunks.
    #[serde(default)]
    pub stream: bool,
}

/// Script executed by the agent inside `page_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptCommand {
    #[serde(default)]
    pub page_url: String,
    #[serde(default)]
    pub script: String,
    #[serde(rename = "type", default = "default_script_type")]
    pub kind: String,
}

fn default_script_type() -> String {
    SCRIPT_TASK.to_string()
}

impl Default for ScriptCommand {
    fn default() -> Self {
        Self {
            page_url: String::new(),
            script: String::new(),
            kind: default_script_type(),
        }
    }
}

/// Whether a task response carries a stream chunk or a whole result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Stream,
    #[default]
    #[serde(other)]
    Single,
}

/// Nested payload of a `task-response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    #[serde(rename = "type", default)]
    pub kind: ResultKind,
    #[serde(default)]
    pub data: Value,
}

impl TaskPayload {
    /// A whole result.
    #[must_use]
    pub const fn single(data: Value) -> Self {
        Self {
            kind: ResultKind::Single,
            data,
        }
    }

    /// One chunk of a streamed result.
    #[must_use]
    pub const fn chunk(data: Value) -> Self {
        Self {
            kind: ResultKind::Stream,
            data,
        }
    }
}
