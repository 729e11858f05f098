//! # Persistent Actors
//!
//! Event-sourced entities. A [`PersistentBehavior`] never mutates its state directly: it
//! records events with [`PersistentContext::persist`], and the runtime feeds every durable
//! event back through [`PersistentBehavior::handle_event`].
//!
//! ## Lifecycle
//! 1. **Recovering** (`on_start`): the full log is read from sequence 0 and replayed through
//!    `handle_recover` in order. An empty log is a fresh entity.
//! 2. **Ready** (`receive`): the business handler runs; each `persist` writes at the cursor
//!    and buffers the event. When the handler returns, buffered events are applied in order.
//!
//! [`PersistentActor`] is the decorator that maps this onto the plain [`Actor`] contract.

use crate::framework::{spawn, Actor, ActorError, ActorRef, Context, Message};
use crate::persistence::{PersistenceProvider, StorageError};
use async_trait::async_trait;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

/// Business logic of an event-sourced entity.
#[async_trait]
pub trait PersistentBehavior: Send + 'static {
    type Event: Clone + Send + Sync + 'static;

    /// Durable identity scoping this entity's event log.
    fn persistence_id(&self) -> String;

    /// Handles a command. State changes go through `ctx.persist`, never direct mutation.
    async fn receive(
        &mut self,
        ctx: &mut PersistentContext<'_, Self::Event>,
        message: Message,
    ) -> Result<(), ActorError>;

    /// The single state-transition function, for live and replayed events alike.
    fn handle_event(&mut self, event: &Self::Event);

    /// Applies a replayed event during recovery.
    fn handle_recover(&mut self, event: &Self::Event) {
        self.handle_event(event);
    }
}

/// Write cursor and pending events of one entity.
struct EventJournal<E: Send + 'static> {
    persistence_id: String,
    sequence_id: u64,
    provider: Arc<dyn PersistenceProvider<E>>,
    live_events: Vec<E>,
}

/// The [`Context`] of a persistent entity, plus [`persist`](Self::persist).
///
/// Dereferences to [`Context`], so `reply`, `forward` and `sender` work as usual.
pub struct PersistentContext<'a, E: Send + 'static> {
    ctx: &'a Context,
    journal: &'a mut EventJournal<E>,
}

impl<E: Clone + Send + Sync + 'static> PersistentContext<'_, E> {
    /// Durably appends `event` at the current cursor.
    ///
    /// The event is applied to the entity after the current `receive` returns. A rejected
    /// write is fatal to the entity.
    pub async fn persist(&mut self, event: E) -> Result<(), ActorError> {
        let journal = &mut *self.journal;
        journal
            .provider
            .persist_event(&journal.persistence_id, journal.sequence_id, event.clone())
            .await
            .map_err(|source| ActorError::Persist {
                persistence_id: journal.persistence_id.clone(),
                sequence_id: journal.sequence_id,
                source,
            })?;
        debug!(
            persistence_id = %journal.persistence_id,
            sequence_id = journal.sequence_id,
            "Event persisted"
        );
        journal.sequence_id += 1;
        journal.live_events.push(event);
        Ok(())
    }

    pub fn persistence_id(&self) -> &str {
        &self.journal.persistence_id
    }

    /// Sequence number the next `persist` will write at.
    pub fn sequence_id(&self) -> u64 {
        self.journal.sequence_id
    }
}

impl<E: Send + 'static> Deref for PersistentContext<'_, E> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx
    }
}

/// Runs a [`PersistentBehavior`] as an [`Actor`].
pub struct PersistentActor<B: PersistentBehavior> {
    behavior: B,
    journal: EventJournal<B::Event>,
}

impl<B: PersistentBehavior> PersistentActor<B> {
    pub fn new(behavior: B, provider: Arc<dyn PersistenceProvider<B::Event>>) -> Self {
        Self {
            behavior,
            journal: EventJournal {
                persistence_id: String::new(),
                sequence_id: 0,
                provider,
                live_events: Vec::new(),
            },
        }
    }

    async fn recover(&mut self) -> Result<(), ActorError> {
        let journal = &mut self.journal;
        journal.persistence_id = self.behavior.persistence_id();

        let events = match journal.provider.get_events(&journal.persistence_id, 0).await {
            Ok(events) => events,
            Err(StorageError::NotFound) => Vec::new(),
            Err(source) => {
                return Err(ActorError::Recovery {
                    persistence_id: journal.persistence_id.clone(),
                    source,
                })
            }
        };

        for persisted in &events {
            if persisted.sequence_id != journal.sequence_id {
                return Err(ActorError::Recovery {
                    persistence_id: journal.persistence_id.clone(),
                    source: StorageError::SequenceConflict {
                        expected: journal.sequence_id,
                        actual: persisted.sequence_id,
                    },
                });
            }
            self.behavior.handle_recover(&persisted.event);
            journal.sequence_id = persisted.sequence_id + 1;
        }

        info!(
            persistence_id = %journal.persistence_id,
            sequence_id = journal.sequence_id,
            replayed = events.len(),
            "Entity recovered"
        );
        Ok(())
    }
}

#[async_trait]
impl<B: PersistentBehavior> Actor for PersistentActor<B> {
    async fn on_start(&mut self, _ctx: &Context) -> Result<(), ActorError> {
        let span = info_span!("recover", persistence_id = %self.behavior.persistence_id());
        self.recover().instrument(span).await
    }

    async fn receive(&mut self, ctx: &Context, message: Message) -> Result<(), ActorError> {
        let result = {
            let mut persistent_ctx = PersistentContext {
                ctx,
                journal: &mut self.journal,
            };
            self.behavior.receive(&mut persistent_ctx, message).await
        };

        // Whatever was made durable is applied, even if the handler failed afterwards.
        for event in self.journal.live_events.drain(..) {
            self.behavior.handle_event(&event);
        }
        result
    }
}

/// Spawns `behavior` as a persistent actor writing to `provider`.
pub fn spawn_persistent<B: PersistentBehavior>(
    behavior: B,
    provider: Arc<dyn PersistenceProvider<B::Event>>,
) -> ActorRef {
    spawn(PersistentActor::new(behavior, provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{InMemoryPersistenceProvider, PersistentEvent};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum CounterEvent {
        Added(u64),
    }

    struct Add(u64);
    struct AddThenFail(u64);
    struct Get;

    struct Counter {
        id: String,
        total: u64,
        applied: Arc<AtomicU64>,
    }

    impl Counter {
        fn new(id: &str) -> Self {
            Self {
                id: id.to_string(),
                total: 0,
                applied: Arc::new(AtomicU64::new(0)),
            }
        }
    }

    #[async_trait]
    impl PersistentBehavior for Counter {
        type Event = CounterEvent;

        fn persistence_id(&self) -> String {
            self.id.clone()
        }

        async fn receive(
            &mut self,
            ctx: &mut PersistentContext<'_, CounterEvent>,
            message: Message,
        ) -> Result<(), ActorError> {
            let message = match message.downcast::<Add>() {
                Ok(Add(n)) => {
                    ctx.persist(CounterEvent::Added(n)).await?;
                    // Not applied yet: state only moves once the handler returns.
                    return ctx.reply(self.total).await;
                }
                Err(message) => message,
            };
            let message = match message.downcast::<AddThenFail>() {
                Ok(AddThenFail(n)) => {
                    ctx.persist(CounterEvent::Added(n)).await?;
                    return Err(ActorError::UnexpectedMessage("AddThenFail"));
                }
                Err(message) => message,
            };
            if message.is::<Get>() {
                return ctx.reply(self.total).await;
            }
            Err(ActorError::UnexpectedMessage(message.type_name()))
        }

        fn handle_event(&mut self, event: &CounterEvent) {
            let CounterEvent::Added(n) = event;
            self.total += n;
            self.applied.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn total(actor: &ActorRef) -> u64 {
        actor.ask(Get).await.unwrap().downcast::<u64>().unwrap()
    }

    #[tokio::test]
    async fn test_replay_matches_single_session() {
        let provider = Arc::new(InMemoryPersistenceProvider::<CounterEvent>::new());

        let first = spawn_persistent(Counter::new("split"), provider.clone());
        for n in [1, 2, 3] {
            first.ask(Add(n)).await.unwrap();
        }
        first.stop();
        first.stopped().await;

        let recovered = spawn_persistent(Counter::new("split"), provider.clone());
        assert_eq!(total(&recovered).await, 6);
        recovered.ask(Add(4)).await.unwrap();

        let single = spawn_persistent(Counter::new("single"), provider.clone());
        for n in [1, 2, 3, 4] {
            single.ask(Add(n)).await.unwrap();
        }

        assert_eq!(total(&recovered).await, total(&single).await);
        let split_log: Vec<_> = provider
            .get_events("split", 0)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.sequence_id)
            .collect();
        assert_eq!(split_log, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_events_apply_after_handler_returns() {
        let provider = Arc::new(InMemoryPersistenceProvider::<CounterEvent>::new());
        let actor = spawn_persistent(Counter::new("c"), provider);

        let before = actor.ask(Add(5)).await.unwrap().downcast::<u64>().unwrap();
        assert_eq!(before, 0);
        assert_eq!(total(&actor).await, 5);
    }

    #[tokio::test]
    async fn test_persisted_events_apply_even_when_handler_fails() {
        let provider = Arc::new(InMemoryPersistenceProvider::<CounterEvent>::new());
        let counter = Counter::new("f");
        let applied = counter.applied.clone();
        let actor = spawn_persistent(counter, provider.clone());

        actor.send(AddThenFail(7)).await.unwrap();
        actor.stopped().await;

        assert_eq!(applied.load(Ordering::SeqCst), 1);
        assert_eq!(provider.max_sequence_id("f").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejected_write_is_fatal() {
        let provider = Arc::new(InMemoryPersistenceProvider::<CounterEvent>::new());
        let counter = Counter::new("w");
        let applied = counter.applied.clone();
        let actor = spawn_persistent(counter, provider.clone());
        assert_eq!(total(&actor).await, 0);

        // A second writer takes sequence 0 behind the entity's back.
        provider
            .persist_event("w", 0, CounterEvent::Added(100))
            .await
            .unwrap();

        let reply = actor.ask_with_timeout(Add(1), Duration::from_millis(200)).await;
        assert!(reply.is_err());
        actor.stopped().await;
        assert_eq!(applied.load(Ordering::SeqCst), 0);
    }

    struct GappyProvider;

    #[async_trait]
    impl PersistenceProvider<CounterEvent> for GappyProvider {
        async fn persist_event(
            &self,
            _persistence_id: &str,
            _sequence_id: u64,
            _event: CounterEvent,
        ) -> Result<(), StorageError> {
            Ok(())
        }

        async fn get_event(
            &self,
            _persistence_id: &str,
            _sequence_id: u64,
        ) -> Result<PersistentEvent<CounterEvent>, StorageError> {
            Err(StorageError::NotFound)
        }

        async fn get_events(
            &self,
            persistence_id: &str,
            _from_sequence_id: u64,
        ) -> Result<Vec<PersistentEvent<CounterEvent>>, StorageError> {
            match persistence_id {
                "gap" => Ok(vec![
                    PersistentEvent::new(0, CounterEvent::Added(1)),
                    PersistentEvent::new(2, CounterEvent::Added(1)),
                ]),
                "empty" => Err(StorageError::NotFound),
                _ => Err(StorageError::Backend("unreachable".to_string())),
            }
        }

        async fn max_sequence_id(&self, _persistence_id: &str) -> Result<u64, StorageError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_recovery_failures_abort_startup() {
        let provider: Arc<dyn PersistenceProvider<CounterEvent>> = Arc::new(GappyProvider);

        for id in ["gap", "down"] {
            let actor = spawn_persistent(Counter::new(id), provider.clone());
            actor.stopped().await;
            assert!(matches!(actor.send(Get).await, Err(ActorError::ActorClosed)));
        }

        let fresh = spawn_persistent(Counter::new("empty"), provider);
        assert_eq!(total(&fresh).await, 0);
    }
}
