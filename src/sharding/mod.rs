//! # Sharding
//!
//! Routes messages by logical entity ID to lazily spawned child actors, in two hops:
//!
//! ```text
//! caller ──► ShardRouter ──► ShardOwner[shard] ──► entity actor[entity_id]
//!    ▲                                                    │
//!    └──────────────────── reply ─────────────────────────┘
//! ```
//!
//! Both hops *forward*, so the entity sees the caller as its sender and replies go straight
//! back. The shard and entity maps are plain fields: they are only touched from inside the
//! owning actor's message loop, which never runs two messages at once.
//!
//! Children live as long as their parent. There is no passivation; stopping a router stops
//! its shard owners, which stop their entities.

use crate::framework::{
    spawn_with_capacity, Actor, ActorError, ActorRef, Context, Message, DEFAULT_MAILBOX_CAPACITY,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Resolves the shard index of a message.
pub type ShardFn = Arc<dyn Fn(&Message) -> usize + Send + Sync>;
/// Resolves the entity ID of a message.
pub type EntityIdFn = Arc<dyn Fn(&Message) -> String + Send + Sync>;
/// Builds the behavior for a newly seen entity ID.
pub type EntityFactory = Arc<dyn Fn(&str) -> Box<dyn Actor> + Send + Sync>;

/// Instantiates an entity actor without delivering anything to it.
///
/// Sent to a [`ShardRouter`], this bypasses the routing functions and uses the given shard
/// and entity ID directly. Sending it for an entity that already exists does nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureEntity {
    pub shard: usize,
    pub entity_id: String,
}

/// What a router hands to a shard owner.
///
/// `payload` is `None` when the router is only making sure the entity exists.
#[derive(Debug)]
pub struct ShardEnvelope {
    pub entity_id: String,
    pub payload: Option<Message>,
}

// =============================================================================
// ROUTER
// =============================================================================

/// Top-level router owning a fixed number of shard slots.
pub struct ShardRouter {
    shard_of: ShardFn,
    entity_id_of: EntityIdFn,
    factory: EntityFactory,
    shards: Vec<Option<ActorRef>>,
    mailbox_capacity: usize,
}

impl ShardRouter {
    pub fn new<S, I, F>(shard_count: usize, shard_of: S, entity_id_of: I, factory: F) -> Self
    where
        S: Fn(&Message) -> usize + Send + Sync + 'static,
        I: Fn(&Message) -> String + Send + Sync + 'static,
        F: Fn(&str) -> Box<dyn Actor> + Send + Sync + 'static,
    {
        Self::from_parts(
            shard_count,
            Arc::new(shard_of),
            Arc::new(entity_id_of),
            Arc::new(factory),
        )
    }

    /// Builds a router from already shared routing functions, so several routers can use
    /// the same ones.
    pub fn from_parts(
        shard_count: usize,
        shard_of: ShardFn,
        entity_id_of: EntityIdFn,
        factory: EntityFactory,
    ) -> Self {
        Self {
            shard_of,
            entity_id_of,
            factory,
            shards: vec![None; shard_count],
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }

    /// Mailbox capacity for every shard owner and entity this router spawns.
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// The owner for `shard`, spawning it on first use. `None` if the index is out of range.
    fn owner(&mut self, shard: usize) -> Option<&ActorRef> {
        let slot = self.shards.get_mut(shard)?;
        if slot.is_none() {
            debug!(shard, "Spawning shard owner");
            let owner = ShardOwner::new(shard, self.factory.clone(), self.mailbox_capacity);
            *slot = Some(spawn_with_capacity(owner, self.mailbox_capacity));
        }
        slot.as_ref()
    }
}

#[async_trait]
impl Actor for ShardRouter {
    async fn receive(&mut self, ctx: &Context, message: Message) -> Result<(), ActorError> {
        let (shard, envelope) = match message.downcast::<EnsureEntity>() {
            Ok(EnsureEntity { shard, entity_id }) => (
                shard,
                ShardEnvelope {
                    entity_id,
                    payload: None,
                },
            ),
            Err(message) => {
                let shard = (self.shard_of)(&message);
                let entity_id = (self.entity_id_of)(&message);
                (
                    shard,
                    ShardEnvelope {
                        entity_id,
                        payload: Some(message),
                    },
                )
            }
        };

        let shard_count = self.shard_count();
        let Some(owner) = self.owner(shard) else {
            error!(
                shard,
                shard_count,
                entity_id = %envelope.entity_id,
                "Shard index out of range, message dropped"
            );
            return Ok(());
        };

        if ctx.forward(envelope, owner).await.is_err() {
            warn!(shard, "Shard owner unavailable, message dropped");
        }
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &Context) {
        let owners: Vec<ActorRef> = self.shards.iter_mut().filter_map(Option::take).collect();
        for owner in &owners {
            owner.stop();
        }
        for owner in &owners {
            owner.stopped().await;
        }
    }
}

// =============================================================================
// SHARD OWNER
// =============================================================================

/// Owns the entity actors of one shard.
pub struct ShardOwner {
    shard: usize,
    factory: EntityFactory,
    entities: HashMap<String, ActorRef>,
    mailbox_capacity: usize,
}

impl ShardOwner {
    pub fn new(shard: usize, factory: EntityFactory, mailbox_capacity: usize) -> Self {
        Self {
            shard,
            factory,
            entities: HashMap::new(),
            mailbox_capacity,
        }
    }

    fn entity(&mut self, entity_id: &str) -> &ActorRef {
        let shard = self.shard;
        let factory = &self.factory;
        let capacity = self.mailbox_capacity;
        self.entities.entry(entity_id.to_string()).or_insert_with(|| {
            debug!(shard, entity_id, "Spawning entity");
            spawn_with_capacity(factory(entity_id), capacity)
        })
    }
}

#[async_trait]
impl Actor for ShardOwner {
    async fn receive(&mut self, ctx: &Context, message: Message) -> Result<(), ActorError> {
        let ShardEnvelope { entity_id, payload } = message
            .downcast::<ShardEnvelope>()
            .map_err(|m| ActorError::UnexpectedMessage(m.type_name()))?;

        let shard = self.shard;
        let entity = self.entity(&entity_id);
        let Some(payload) = payload else {
            return Ok(());
        };
        if ctx.forward(payload, entity).await.is_err() {
            warn!(shard, entity_id = %entity_id, "Entity unavailable, message dropped");
        }
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &Context) {
        for entity in self.entities.values() {
            entity.stop();
        }
        for (_, entity) in self.entities.drain() {
            entity.stopped().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::spawn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Routed {
        shard: usize,
        entity: &'static str,
    }

    #[derive(Default)]
    struct Counters {
        constructed: AtomicUsize,
        received: AtomicUsize,
        stopped: AtomicUsize,
    }

    /// Replies with its own entity ID.
    struct Probe {
        entity_id: String,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl Actor for Probe {
        async fn receive(&mut self, ctx: &Context, _message: Message) -> Result<(), ActorError> {
            self.counters.received.fetch_add(1, Ordering::SeqCst);
            ctx.reply(self.entity_id.clone()).await
        }

        async fn on_stop(&mut self, _ctx: &Context) {
            self.counters.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn router(counters: Arc<Counters>) -> ActorRef {
        spawn(ShardRouter::new(
            4,
            |m: &Message| m.downcast_ref::<Routed>().map_or(0, |r| r.shard),
            |m: &Message| {
                m.downcast_ref::<Routed>()
                    .map_or_else(String::new, |r| r.entity.to_string())
            },
            move |entity_id: &str| {
                counters.constructed.fetch_add(1, Ordering::SeqCst);
                Box::new(Probe {
                    entity_id: entity_id.to_string(),
                    counters: counters.clone(),
                }) as Box<dyn Actor>
            },
        ))
    }

    async fn ask_entity(router: &ActorRef, shard: usize, entity: &'static str) -> String {
        router
            .ask(Routed { shard, entity })
            .await
            .unwrap()
            .downcast::<String>()
            .unwrap()
    }

    #[tokio::test]
    async fn test_same_entity_is_constructed_once() {
        let counters = Arc::new(Counters::default());
        let router = router(counters.clone());

        for _ in 0..3 {
            assert_eq!(ask_entity(&router, 1, "a").await, "a");
        }
        assert_eq!(counters.constructed.load(Ordering::SeqCst), 1);

        assert_eq!(ask_entity(&router, 1, "b").await, "b");
        assert_eq!(counters.constructed.load(Ordering::SeqCst), 2);
        assert_eq!(counters.received.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_reply_reaches_original_caller() {
        let counters = Arc::new(Counters::default());
        let router = router(counters);
        let (output, mut replies) = tokio::sync::mpsc::channel(1);
        let caller = spawn(crate::framework::ChannelActor::new(output));

        router
            .send_from(Routed { shard: 2, entity: "x" }, Some(caller.clone()))
            .await
            .unwrap();

        let reply = replies.recv().await.unwrap();
        assert_eq!(reply.downcast::<String>().unwrap(), "x");
    }

    #[tokio::test]
    async fn test_out_of_range_shard_is_dropped() {
        let counters = Arc::new(Counters::default());
        let router = router(counters.clone());

        router.send(Routed { shard: 9, entity: "lost" }).await.unwrap();
        assert_eq!(ask_entity(&router, 0, "kept").await, "kept");
        assert_eq!(counters.constructed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ensure_entity_spawns_without_delivery() {
        let counters = Arc::new(Counters::default());
        let router = router(counters.clone());

        router
            .send(EnsureEntity {
                shard: 3,
                entity_id: "e".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(ask_entity(&router, 3, "e").await, "e");

        assert_eq!(counters.constructed.load(Ordering::SeqCst), 1);
        assert_eq!(counters.received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stopping_router_stops_entities() {
        let counters = Arc::new(Counters::default());
        let router = router(counters.clone());
        ask_entity(&router, 0, "a").await;
        ask_entity(&router, 1, "b").await;

        router.stop();
        router.stopped().await;

        assert_eq!(counters.stopped.load(Ordering::SeqCst), 2);
    }
}
