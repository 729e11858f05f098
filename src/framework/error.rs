//! # Runtime Errors
//!
//! One error type for everything an actor can fail with. Most variants are fatal to the
//! actor that returns them from a lifecycle hook; [`ActorError::AskTimeout`] is the one a
//! caller is expected to inspect and decide about.

use crate::persistence::StorageError;
use std::time::Duration;

/// Errors produced by the actor runtime and the components built on it.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("Actor closed")]
    ActorClosed,

    #[error("Ask timed out after {0:?}")]
    AskTimeout(Duration),

    #[error("Recovery failed for {persistence_id}: {source}")]
    Recovery {
        persistence_id: String,
        #[source]
        source: StorageError,
    },

    #[error("Persist rejected for {persistence_id} at sequence {sequence_id}: {source}")]
    Persist {
        persistence_id: String,
        sequence_id: u64,
        #[source]
        source: StorageError,
    },

    #[error("Offset read failed for {offset_name}: {source}")]
    Offset {
        offset_name: String,
        #[source]
        source: StorageError,
    },

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(&'static str),

    #[error("Actor panicked: {0}")]
    Panicked(String),

    #[error("Entity error: {0}")]
    EntityError(Box<dyn std::error::Error + Send + Sync>),
}

impl ActorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ActorError::AskTimeout(_))
    }
}
