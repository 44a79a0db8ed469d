//! Agent session registry and command relay for browser agents.
//!
//! Provides:
//! - `SessionRegistry` - Track connected agents and pick one at random
//! - `RelayManager` - Send a command to an agent and await its result

pub mod manager;
pub mod registry;

pub use manager::{AgentCommand, ManagerError, RelayManager};
pub use registry::{AgentConnection, ConnectionInfo, RegistryError, SessionRegistry, now_millis};
