//! # Sharded Journal
//!
//! One addressable actor per business domain, combining a sharded pool of persistent
//! entities (write side) with a sharded pool of read sides projecting their logs.
//!
//! ```text
//!                      ┌─► write ShardRouter ─► ShardOwner ─► PersistentActor(entity)
//! caller ─► journal ───┤        (forward, sender kept)
//!                      └─► read ShardRouter ──► ShardOwner ─► ReadSideActor(entity)
//!                               (EnsureEntity)                    ▲
//!                                                                 └── EventStream(log)
//! ```
//!
//! Both pools use the same shard count and routing functions. Commands only flow to the
//! write side; the read side receives an [`EnsureEntity`] so the projection for that entity
//! is running, and consumes the entity's log through its own stream.

use crate::framework::{spawn_with_capacity, Actor, ActorError, ActorRef, Context, Message};
use crate::persistence::{
    BatchableQuery, PersistenceProvider, PersistentEvent, SequenceTracker, StorageError,
};
use crate::persistent_actor::{PersistentActor, PersistentBehavior, PersistentContext};
use crate::read_side::{EventSource, ProviderEventSource, ReadSideActor, ReadSideHandler};
use crate::runtime::RuntimeConfig;
use crate::sharding::{EnsureEntity, EntityFactory, EntityIdFn, ShardFn, ShardRouter};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, Instrument};

/// Everything domain-specific about a journal.
#[async_trait]
pub trait JournalDomain: Send + Sync + 'static {
    type Event: Clone + Send + Sync + 'static;
    type Entity: PersistentBehavior<Event = Self::Event>;
    type Mutation: BatchableQuery;

    /// Journal name; prefixes every read-side offset name.
    fn name(&self) -> &str;

    fn shard_of(&self, message: &Message) -> usize;

    fn entity_id_of(&self, message: &Message) -> String;

    /// A fresh entity for `entity_id`, before recovery.
    fn create_entity(&self, entity_id: &str) -> Self::Entity;

    /// The view update implied by one of `entity_id`'s events. Must tolerate re-application.
    async fn read_event(
        &self,
        entity_id: &str,
        event: &PersistentEvent<Self::Event>,
    ) -> Result<Self::Mutation, StorageError>;
}

/// Write-side entity whose log is keyed by its entity ID.
pub struct JournalWriteSide<D: JournalDomain> {
    entity: D::Entity,
    entity_id: String,
}

impl<D: JournalDomain> JournalWriteSide<D> {
    pub fn new(domain: &D, entity_id: &str) -> Self {
        Self {
            entity: domain.create_entity(entity_id),
            entity_id: entity_id.to_string(),
        }
    }
}

#[async_trait]
impl<D: JournalDomain> PersistentBehavior for JournalWriteSide<D> {
    type Event = D::Event;

    fn persistence_id(&self) -> String {
        self.entity_id.clone()
    }

    async fn receive(
        &mut self,
        ctx: &mut PersistentContext<'_, D::Event>,
        message: Message,
    ) -> Result<(), ActorError> {
        self.entity.receive(ctx, message).await
    }

    fn handle_event(&mut self, event: &D::Event) {
        self.entity.handle_event(event);
    }

    fn handle_recover(&mut self, event: &D::Event) {
        self.entity.handle_recover(event);
    }
}

/// Read side projecting one entity's log through [`JournalDomain::read_event`].
pub struct JournalReadSide<D: JournalDomain> {
    domain: Arc<D>,
    entity_id: String,
    provider: Arc<dyn PersistenceProvider<D::Event>>,
    poll_interval: Duration,
}

impl<D: JournalDomain> JournalReadSide<D> {
    pub fn new(
        domain: Arc<D>,
        entity_id: &str,
        provider: Arc<dyn PersistenceProvider<D::Event>>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            domain,
            entity_id: entity_id.to_string(),
            provider,
            poll_interval,
        }
    }
}

#[async_trait]
impl<D: JournalDomain> ReadSideHandler for JournalReadSide<D> {
    type Event = D::Event;
    type Mutation = D::Mutation;

    fn offset_name(&self) -> String {
        format!("{}:{}", self.domain.name(), self.entity_id)
    }

    fn event_source(&self, start_sequence_id: u64) -> Box<dyn EventSource<D::Event>> {
        Box::new(
            ProviderEventSource::new(self.provider.clone(), &self.entity_id, start_sequence_id)
                .with_poll_interval(self.poll_interval),
        )
    }

    async fn read_event(
        &mut self,
        event: &PersistentEvent<D::Event>,
    ) -> Result<D::Mutation, StorageError> {
        self.domain.read_event(&self.entity_id, event).await
    }
}

/// Facade actor over the write and read pools of one domain.
pub struct ShardedJournal<D: JournalDomain> {
    domain: Arc<D>,
    provider: Arc<dyn PersistenceProvider<D::Event>>,
    tracker: Arc<dyn SequenceTracker<Mutation = D::Mutation>>,
    config: RuntimeConfig,
    write_side: Option<ActorRef>,
    read_side: Option<ActorRef>,
}

impl<D: JournalDomain> ShardedJournal<D> {
    pub fn new(
        domain: D,
        provider: Arc<dyn PersistenceProvider<D::Event>>,
        tracker: Arc<dyn SequenceTracker<Mutation = D::Mutation>>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            domain: Arc::new(domain),
            provider,
            tracker,
            config,
            write_side: None,
            read_side: None,
        }
    }

    fn router(&self, factory: EntityFactory) -> ActorRef {
        let shard_domain = self.domain.clone();
        let shard_of: ShardFn = Arc::new(move |m: &Message| shard_domain.shard_of(m));
        let id_domain = self.domain.clone();
        let entity_id_of: EntityIdFn = Arc::new(move |m: &Message| id_domain.entity_id_of(m));

        let capacity = self.config.mailbox.capacity;
        let router = ShardRouter::from_parts(
            self.config.sharding.shard_count,
            shard_of,
            entity_id_of,
            factory,
        )
        .with_mailbox_capacity(capacity);
        spawn_with_capacity(router, capacity)
    }

    fn write_factory(&self) -> EntityFactory {
        let domain = self.domain.clone();
        let provider = self.provider.clone();
        Arc::new(move |entity_id: &str| {
            let entity = JournalWriteSide::new(domain.as_ref(), entity_id);
            Box::new(PersistentActor::new(entity, provider.clone())) as Box<dyn Actor>
        })
    }

    fn read_factory(&self) -> EntityFactory {
        let domain = self.domain.clone();
        let provider = self.provider.clone();
        let tracker = self.tracker.clone();
        let poll_interval = self.config.event_poll_interval();
        let retry_delay = self.config.read_side_retry_delay();
        Arc::new(move |entity_id: &str| {
            let handler =
                JournalReadSide::new(domain.clone(), entity_id, provider.clone(), poll_interval);
            let read_side =
                ReadSideActor::new(handler, tracker.clone()).with_retry_delay(retry_delay);
            Box::new(read_side) as Box<dyn Actor>
        })
    }
}

#[async_trait]
impl<D: JournalDomain> Actor for ShardedJournal<D> {
    async fn on_start(&mut self, _ctx: &Context) -> Result<(), ActorError> {
        self.write_side = Some(self.router(self.write_factory()));
        self.read_side = Some(self.router(self.read_factory()));
        info!(
            journal = self.domain.name(),
            shard_count = self.config.sharding.shard_count,
            "Journal started"
        );
        Ok(())
    }

    async fn receive(&mut self, ctx: &Context, message: Message) -> Result<(), ActorError> {
        let (Some(write_side), Some(read_side)) = (&self.write_side, &self.read_side) else {
            return Err(ActorError::ActorClosed);
        };
        let ensure = EnsureEntity {
            shard: self.domain.shard_of(&message),
            entity_id: self.domain.entity_id_of(&message),
        };

        let span = info_span!(
            "journal",
            name = self.domain.name(),
            entity_id = %ensure.entity_id,
            shard = ensure.shard
        );
        async {
            ctx.forward(message, write_side).await?;
            read_side.send(ensure).await
        }
        .instrument(span)
        .await
    }

    async fn on_stop(&mut self, _ctx: &Context) {
        let routers: Vec<ActorRef> = [self.write_side.take(), self.read_side.take()]
            .into_iter()
            .flatten()
            .collect();
        for router in &routers {
            router.stop();
        }
        for router in &routers {
            router.stopped().await;
        }
    }
}

/// Spawns a [`ShardedJournal`] with the configured mailbox capacity.
pub fn spawn_journal<D: JournalDomain>(
    domain: D,
    provider: Arc<dyn PersistenceProvider<D::Event>>,
    tracker: Arc<dyn SequenceTracker<Mutation = D::Mutation>>,
    config: RuntimeConfig,
) -> ActorRef {
    let capacity = config.mailbox.capacity;
    spawn_with_capacity(ShardedJournal::new(domain, provider, tracker, config), capacity)
}
