//! # Runtime Configuration
//!
//! Tunables for mailboxes, timeouts and sharding, read from TOML. Every field has a
//! default, so an empty document (or no file at all) gives the built-in settings:
//!
//! ```toml
//! [mailbox]
//! capacity = 10
//!
//! [timeouts]
//! ask_timeout_ms = 3000
//! read_side_retry_ms = 1000
//! event_poll_interval_ms = 1000
//!
//! [sharding]
//! shard_count = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub mailbox: MailboxConfig,
    pub timeouts: TimeoutConfig,
    pub sharding: ShardingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Pending envelopes an actor holds before senders wait.
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for callers that pass [`RuntimeConfig::ask_timeout`] to
    /// [`ActorRef::ask_with_timeout`](crate::framework::ActorRef::ask_with_timeout). Plain
    /// `ask` always uses [`DEFAULT_ASK_TIMEOUT`](crate::framework::DEFAULT_ASK_TIMEOUT).
    pub ask_timeout_ms: u64,
    /// Pause before a failed read-side update is attempted again.
    pub read_side_retry_ms: u64,
    /// Pause between polls for an event that has not been written yet.
    pub event_poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingConfig {
    pub shard_count: usize,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self { capacity: 10 }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            ask_timeout_ms: 3_000,
            read_side_retry_ms: 1_000,
            event_poll_interval_ms: 1_000,
        }
    }
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self { shard_count: 10 }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// For [`ActorRef::ask_with_timeout`](crate::framework::ActorRef::ask_with_timeout).
    pub const fn ask_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.ask_timeout_ms)
    }

    pub const fn read_side_retry_delay(&self) -> Duration {
        Duration::from_millis(self.timeouts.read_side_retry_ms)
    }

    pub const fn event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.timeouts.event_poll_interval_ms)
    }
}
