//! # Tracing Setup
//!
//! Every component logs through `tracing` with structured fields instead of formatted
//! strings, so one entity or one projection can be followed through the whole pipeline:
//!
//! | Field | Set by |
//! |-------|--------|
//! | `actor`, `actor_type` | every actor cell (`Actor started`, `Actor failed`, `Actor stopped`) |
//! | `shard`, `entity_id` | routers and shard owners |
//! | `persistence_id`, `sequence_id` | persistent entities (`Entity recovered`, `Event persisted`) |
//! | `offset_name` | read sides (`Read side started`, `Read side update failed, retrying`) |
//!
//! Levels follow one rule: `info` for lifecycle, `debug` for per-message flow, `warn` for
//! failures that are retried, `error` for failures that stop an actor.
//!
//! ```text
//! RUST_LOG=info cargo run
//! RUST_LOG=persistent_actors=debug cargo run
//! ```

/// Installs a compact fmt subscriber filtered by `RUST_LOG`.
///
/// Calling it again once a global subscriber is set does nothing.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}
