//! Storage abstractions.
//!
//! Actors depend only on the traits in [`traits`]; [`memory`] provides the in-process backend
//! used by the tests and the demo binary.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::StorageError;
pub use memory::{InMemoryPersistenceProvider, MemoryMutation, MemorySequenceTracker, MemoryStore};
pub use traits::{BatchableQuery, PersistenceProvider, PersistentEvent, SequenceTracker};
