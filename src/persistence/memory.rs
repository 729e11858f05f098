//! # In-Memory Backend
//!
//! Stand-ins for a real database, used by the tests and the demo binary. These are the only
//! places in the crate that take a lock: many actors share one provider or store at once.
//!
//! - [`InMemoryPersistenceProvider`] - event logs in a `HashMap<String, Vec<E>>`
//! - [`MemoryStore`] - offset and view tables, written through [`MemoryMutation`] batches
//! - [`MemorySequenceTracker`] - [`SequenceTracker`] over a [`MemoryStore`]

use crate::persistence::error::StorageError;
use crate::persistence::traits::{
    BatchableQuery, PersistenceProvider, PersistentEvent, SequenceTracker,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// EVENT LOG
// =============================================================================

/// Event logs held in memory.
pub struct InMemoryPersistenceProvider<E> {
    events: Mutex<HashMap<String, Vec<E>>>,
}

impl<E> InMemoryPersistenceProvider<E> {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(HashMap::new()),
        }
    }
}

impl<E> Default for InMemoryPersistenceProvider<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E> PersistenceProvider<E> for InMemoryPersistenceProvider<E>
where
    E: Clone + Send + Sync + 'static,
{
    async fn persist_event(
        &self,
        persistence_id: &str,
        sequence_id: u64,
        event: E,
    ) -> Result<(), StorageError> {
        let mut events = lock(&self.events);
        let log = events.entry(persistence_id.to_string()).or_default();
        let expected = log.len() as u64;
        if sequence_id != expected {
            return Err(StorageError::SequenceConflict {
                expected,
                actual: sequence_id,
            });
        }
        log.push(event);
        Ok(())
    }

    async fn get_event(
        &self,
        persistence_id: &str,
        sequence_id: u64,
    ) -> Result<PersistentEvent<E>, StorageError> {
        let events = lock(&self.events);
        events
            .get(persistence_id)
            .and_then(|log| log.get(usize::try_from(sequence_id).ok()?))
            .map(|event| PersistentEvent::new(sequence_id, event.clone()))
            .ok_or(StorageError::NotFound)
    }

    async fn get_events(
        &self,
        persistence_id: &str,
        from_sequence_id: u64,
    ) -> Result<Vec<PersistentEvent<E>>, StorageError> {
        let events = lock(&self.events);
        let Some(log) = events.get(persistence_id) else {
            return Ok(Vec::new());
        };
        Ok(log
            .iter()
            .enumerate()
            .skip(usize::try_from(from_sequence_id).unwrap_or(usize::MAX))
            .map(|(seq, event)| PersistentEvent::new(seq as u64, event.clone()))
            .collect())
    }

    async fn max_sequence_id(&self, persistence_id: &str) -> Result<u64, StorageError> {
        let events = lock(&self.events);
        Ok(events
            .get(persistence_id)
            .map_or(0, |log| log.len() as u64))
    }
}

// =============================================================================
// TABLES & MUTATIONS
// =============================================================================

#[derive(Debug, Default)]
struct MemoryTables {
    offsets: HashMap<String, u64>,
    rows: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: MemoryTables,
    failures_remaining: usize,
    executed_batches: usize,
}

/// Shared in-memory tables: read-side offsets plus string-keyed view rows.
///
/// Cloning is cheap and every clone sees the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(&self, name: &str) -> Option<u64> {
        lock(&self.state).tables.offsets.get(name).copied()
    }

    pub fn row(&self, key: &str) -> Option<String> {
        lock(&self.state).tables.rows.get(key).cloned()
    }

    /// Number of batches that executed successfully.
    pub fn executed_batches(&self) -> usize {
        lock(&self.state).executed_batches
    }

    /// Makes the next `count` executions fail without applying anything.
    pub fn fail_next_executes(&self, count: usize) {
        lock(&self.state).failures_remaining = count;
    }

    /// A batch with no writes; the identity for [`BatchableQuery::merge`].
    pub fn empty(&self) -> MemoryMutation {
        MemoryMutation {
            store: self.clone(),
            ops: Vec::new(),
        }
    }

    pub fn set_row(&self, key: impl Into<String>, value: impl Into<String>) -> MemoryMutation {
        self.single(MemoryOp::SetRow(key.into(), value.into()))
    }

    pub fn delete_row(&self, key: impl Into<String>) -> MemoryMutation {
        self.single(MemoryOp::DeleteRow(key.into()))
    }

    pub fn set_offset(&self, name: impl Into<String>, sequence_id: u64) -> MemoryMutation {
        self.single(MemoryOp::SetOffset(name.into(), sequence_id))
    }

    fn single(&self, op: MemoryOp) -> MemoryMutation {
        MemoryMutation {
            store: self.clone(),
            ops: vec![op],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MemoryOp {
    SetOffset(String, u64),
    SetRow(String, String),
    DeleteRow(String),
}

impl MemoryOp {
    fn apply(self, tables: &mut MemoryTables) {
        match self {
            MemoryOp::SetOffset(name, sequence_id) => {
                tables.offsets.insert(name, sequence_id);
            }
            MemoryOp::SetRow(key, value) => {
                tables.rows.insert(key, value);
            }
            MemoryOp::DeleteRow(key) => {
                tables.rows.remove(&key);
            }
        }
    }
}

/// A batch of writes against one [`MemoryStore`], applied under a single lock.
///
/// Both halves of a merge must come from the same store; the result writes to the left one.
pub struct MemoryMutation {
    store: MemoryStore,
    ops: Vec<MemoryOp>,
}

#[async_trait]
impl BatchableQuery for MemoryMutation {
    fn merge(mut self, other: Self) -> Self {
        self.ops.extend(other.ops);
        self
    }

    fn query_count(&self) -> usize {
        self.ops.len()
    }

    async fn execute(self) -> Result<(), StorageError> {
        let mut state = lock(&self.store.state);
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            warn!(queries = self.ops.len(), "Injected batch failure");
            return Err(StorageError::Backend("injected failure".to_string()));
        }
        debug!(queries = self.ops.len(), "Executing batch");
        for op in self.ops {
            op.apply(&mut state.tables);
        }
        state.executed_batches += 1;
        Ok(())
    }
}

// =============================================================================
// SEQUENCE TRACKER
// =============================================================================

/// Read-side offsets kept in a [`MemoryStore`].
#[derive(Clone, Default)]
pub struct MemorySequenceTracker {
    store: MemoryStore,
}

impl MemorySequenceTracker {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SequenceTracker for MemorySequenceTracker {
    type Mutation = MemoryMutation;

    async fn get_sequence_id(&self, name: &str) -> Result<u64, StorageError> {
        Ok(self.store.offset(name).unwrap_or(0))
    }

    fn update_sequence(&self, name: &str, sequence_id: u64) -> MemoryMutation {
        self.store.set_offset(name, sequence_id)
    }
}
