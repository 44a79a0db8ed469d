//! Core building blocks for relaying commands to browser agents.
//!
//! This crate provides the fundamental building blocks:
//! - `Envelope` - Typed wire envelope exchanged with agents
//! - `MessageChannel` - Ordered outbound queue, one per agent connection
//! - `TaskStore` - Correlates task ids with pending results
//! - `RelayConfig` - Timeouts and intervals shared by the relay

pub mod channel;
pub mod config;
pub mod envelope;
pub mod tasks;

pub use channel::{ChannelError, ConnectionId, MessageChannel, Outbound};
pub use config::RelayConfig;
pub use envelope::{
    Envelope, FetchCommand, LOAD_HTML_TASK, RegisterAck, ResultKind, SCRIPT_TASK, STREAM_SENTINEL,
    ScriptCommand, TaskPayload,
};
pub use tasks::{TaskError, TaskMode, TaskState, TaskStore, TaskTimeouts};
