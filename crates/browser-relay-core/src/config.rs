//! Relay timeouts and intervals.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tasks::TaskTimeouts;

/// Timeouts and intervals shared by the relay.
///
/// Every field is stored in milliseconds and defaults to the value the
/// relay ships with, so a partial JSON document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Overall wait for a single-result task.
    pub single_timeout_ms: u64,
    /// Wait for the first chunk of a streamed task.
    pub stream_start_timeout_ms: u64,
    /// Budget from the first chunk until the stream completes.
    pub stream_completion_timeout_ms: u64,
    /// Hard bound on a bridged stream, terminal or not.
    pub stream_max_duration_ms: u64,
    /// How long a caller waits for an agent to connect.
    pub agent_wait_ms: u64,
    /// Re-sample cadence while waiting for an agent.
    pub agent_poll_ms: u64,
    /// Keepalive cadence on bridged streams.
    pub heartbeat_ms: u64,
    /// Age at which task records without a waiter and tombstones are dropped.
    pub orphan_ttl_ms: u64,
    /// Cadence of the task store sweep.
    pub sweep_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            single_timeout_ms: 60_000,
            stream_start_timeout_ms: 60_000,
            stream_completion_timeout_ms: 120_000,
            stream_max_duration_ms: 120_000,
            agent_wait_ms: 10_000,
            agent_poll_ms: 300,
            heartbeat_ms: 1_000,
            orphan_ttl_ms: 300_000,
            sweep_interval_ms: 30_000,
        }
    }
}

impl RelayConfig {
    /// Parse a JSON config document.
    ///
    /// # Errors
    /// Returns error if the document is not valid JSON for this shape.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    #[must_use]
    pub const fn single_timeout(&self) -> Duration {
        Duration::from_millis(self.single_timeout_ms)
    }

    #[must_use]
    pub const fn stream_start_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_start_timeout_ms)
    }

    #[must_use]
    pub const fn stream_completion_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_completion_timeout_ms)
    }

    #[must_use]
    pub const fn stream_max_duration(&self) -> Duration {
        Duration::from_millis(self.stream_max_duration_ms)
    }

    #[must_use]
    pub const fn agent_wait(&self) -> Duration {
        Duration::from_millis(self.agent_wait_ms)
    }

    #[must_use]
    pub const fn agent_poll(&self) -> Duration {
        Duration::from_millis(self.agent_poll_ms)
    }

    #[must_use]
    pub const fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    #[must_use]
    pub const fn orphan_ttl(&self) -> Duration {
        Duration::from_millis(self.orphan_ttl_ms)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Timeouts for a single-result task.
    #[must_use]
    pub const fn single_timeouts(&self) -> TaskTimeouts {
        TaskTimeouts::single(self.single_timeout())
    }

    /// Timeouts for a streamed task.
    #[must_use]
    pub const fn stream_timeouts(&self) -> TaskTimeouts {
        TaskTimeouts::stream(self.stream_start_timeout(), self.stream_completion_timeout())
    }
}
