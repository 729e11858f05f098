//! Actor runtime.
//!
//! This module provides the mailbox/scheduling primitive every other component runs on.
//!
//! # Main Components
//!
//! - [`Actor`] - Trait implemented by every behavior (`on_start`, `receive`, `on_stop`)
//! - [`spawn`] - Starts a behavior in its own Tokio task and returns its [`ActorRef`]
//! - [`ActorRef`] - Cloneable handle: `send`, `send_from`, `ask`, `stop`
//! - [`Context`] - Per-invocation view: `self_ref`, `sender`, `reply`, `forward`
//! - [`Message`] - Opaque payload with typed downcasts
//! - [`ActorError`] - Runtime errors, including the distinguished ask timeout
//!
//! # Built-in Behaviors
//!
//! [`FunctionActor`] wraps a closure; [`ChannelActor`] drains into a Tokio channel.

pub mod actor;
pub mod actor_ref;
pub mod behaviors;
pub mod context;
pub mod error;
pub mod message;

pub use actor::{spawn, spawn_with_capacity, Actor, DEFAULT_MAILBOX_CAPACITY};
pub use actor_ref::{ActorId, ActorRef, CellState, DEFAULT_ASK_TIMEOUT};
pub use behaviors::{ChannelActor, FunctionActor};
pub use context::Context;
pub use error::ActorError;
pub use message::{Envelope, Message, SystemMessage};
