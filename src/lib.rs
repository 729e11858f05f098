#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Persistent Actors
//!
//! > **Event-sourced, sharded actors on Tokio.**
//!
//! This crate is a small actor runtime with two things layered on top: entities that
//! rebuild their state from an append-only event log, and read sides that project those
//! logs into queryable views. Nothing is shared between actors except the storage backend.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### One task per actor
//! Every actor runs in its own Tokio task and handles one message at a time. Routers keep
//! their child maps in plain fields and entities mutate their own state freely: no locks,
//! because nothing else can touch them.
//!
//! ### Events before state
//! An entity never changes state directly. It persists an event, and only durable events are
//! applied, through the same function used during recovery. Replaying a log always
//! reproduces the state the entity had when it wrote it.
//!
//! ### Read sides retry, write sides fail
//! A rejected event write means two writers raced on one log; that is a bug, and the entity
//! stops. A failed view update is just the database having a bad moment; the read side
//! sleeps and retries the same event until it lands.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Engine ([`framework`])
//! Mailboxes, lifecycle and request/reply.
//! - **Key items**: [`Actor`](framework::Actor), [`spawn`](framework::spawn),
//!   [`ActorRef`](framework::ActorRef), [`Context`](framework::Context).
//!
//! ### 2. Routing ([`sharding`])
//! Lazily creates one actor per entity ID, grouped into shards.
//! - **Key items**: [`ShardRouter`](sharding::ShardRouter), [`EnsureEntity`](sharding::EnsureEntity).
//!
//! ### 3. Storage ([`persistence`])
//! The only seam to a database: event logs, offsets and batched writes, plus an in-memory
//! backend.
//! - **Key items**: [`PersistenceProvider`](persistence::PersistenceProvider),
//!   [`SequenceTracker`](persistence::SequenceTracker),
//!   [`BatchableQuery`](persistence::BatchableQuery).
//!
//! ### 4. Write Side ([`persistent_actor`]) and Read Side ([`read_side`])
//! - **Key items**: [`PersistentBehavior`](persistent_actor::PersistentBehavior),
//!   [`ReadSideHandler`](read_side::ReadSideHandler).
//!
//! ### 5. Putting It Together ([`journal`])
//! One actor per domain fronting both pools.
//! - **Key items**: [`JournalDomain`](journal::JournalDomain),
//!   [`ShardedJournal`](journal::ShardedJournal).
//!
//! ### 6. Process Setup ([`runtime`])
//! TOML configuration and tracing.
//!
//! ## 🚀 Quick Start
//!
//! ### Running the Demo
//!
//! ```bash
//! # A bank-account journal on the in-memory backend
//! RUST_LOG=info cargo run
//! ```
//!
//! ### Running Tests
//!
//! ```bash
//! cargo test
//! ```

pub mod framework;
pub mod journal;
pub mod persistence;
pub mod persistent_actor;
pub mod read_side;
pub mod runtime;
pub mod sharding;
