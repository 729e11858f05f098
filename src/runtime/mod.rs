//! Process-level setup.
//!
//! # Main Components
//!
//! - [`RuntimeConfig`] - Mailbox, timeout and sharding settings loaded from TOML
//! - [`setup_tracing`] - Initializes the tracing/logging infrastructure

pub mod config;
pub mod tracing;

pub use config::{ConfigError, MailboxConfig, RuntimeConfig, ShardingConfig, TimeoutConfig};
pub use tracing::setup_tracing;
