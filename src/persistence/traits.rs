//! # Storage Contracts
//!
//! The core never talks to a database directly. Everything goes through the three
//! abstractions below, so swapping the backend never touches actor code:
//!
//! - [`PersistenceProvider`] - the per-entity, append-only event log (write side)
//! - [`SequenceTracker`] - durable `name -> offset` checkpoints (read side)
//! - [`BatchableQuery`] - a not-yet-applied write that can be merged and executed atomically

use crate::persistence::error::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One entry of an entity's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentEvent<E> {
    /// Position in the log; contiguous from 0 per persistence ID.
    pub sequence_id: u64,
    pub event: E,
}

impl<E> PersistentEvent<E> {
    pub fn new(sequence_id: u64, event: E) -> Self {
        Self { sequence_id, event }
    }
}

/// Append-only event log keyed by persistence ID.
///
/// Implementations must be safe to share between actors; every entity writes only to its own
/// log, but many entities write concurrently.
#[async_trait]
pub trait PersistenceProvider<E: Send + 'static>: Send + Sync + 'static {
    /// Appends `event` at `sequence_id`.
    ///
    /// Must fail with [`StorageError::SequenceConflict`] unless `sequence_id` equals the
    /// current number of events for `persistence_id`.
    async fn persist_event(
        &self,
        persistence_id: &str,
        sequence_id: u64,
        event: E,
    ) -> Result<(), StorageError>;

    /// Fetches a single event; [`StorageError::NotFound`] if it has not been written yet.
    async fn get_event(
        &self,
        persistence_id: &str,
        sequence_id: u64,
    ) -> Result<PersistentEvent<E>, StorageError>;

    /// Every event from `from_sequence_id` up to the current end, in order.
    async fn get_events(
        &self,
        persistence_id: &str,
        from_sequence_id: u64,
    ) -> Result<Vec<PersistentEvent<E>>, StorageError>;

    /// Number of events stored for `persistence_id` (the next sequence to write), 0 if none.
    async fn max_sequence_id(&self, persistence_id: &str) -> Result<u64, StorageError>;
}

/// A deferred storage write.
///
/// Merging is associative and a merged batch applies as a single atomic unit: either every
/// contained write lands or none does.
#[async_trait]
pub trait BatchableQuery: Send + Sized + 'static {
    fn merge(self, other: Self) -> Self;

    /// Number of individual writes in this batch.
    fn query_count(&self) -> usize;

    async fn execute(self) -> Result<(), StorageError>;
}

/// Durable read-side offsets.
#[async_trait]
pub trait SequenceTracker: Send + Sync + 'static {
    type Mutation: BatchableQuery;

    /// Current offset for `name`; 0 if it was never set.
    async fn get_sequence_id(&self, name: &str) -> Result<u64, StorageError>;

    /// A deferred write setting `name` to `sequence_id`. Nothing happens until it is executed.
    fn update_sequence(&self, name: &str, sequence_id: u64) -> Self::Mutation;
}
