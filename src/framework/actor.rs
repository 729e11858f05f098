//! # Actor Cells
//!
//! This module defines the [`Actor`] trait and the cell that runs it. Each spawned actor
//! gets its own Tokio task, a bounded mailbox and an unbounded control channel.
//!
//! **Concurrency Model**:
//! A cell processes its mailbox *sequentially*. No two invocations of one actor's hooks
//! ever overlap, so an actor can mutate its own fields (maps of children, cursors, buffers)
//! without `Mutex` or `RwLock`. Nothing in this crate processes one mailbox from more than
//! one task, and nothing should.

use crate::framework::actor_ref::{ActorId, ActorRef, CellState};
use crate::framework::context::Context;
use crate::framework::error::ActorError;
use crate::framework::message::{short_type_name, Envelope, Message, SystemMessage};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Mailbox capacity used by [`spawn`].
pub const DEFAULT_MAILBOX_CAPACITY: usize = 10;

/// Behavior run by an actor cell.
///
/// # Lifecycle
/// 1. `on_start` runs exactly once, before any message is handled.
/// 2. `receive` runs once per message, in mailbox order.
/// 3. `on_stop` runs exactly once when the cell terminates, whatever the reason.
///
/// Returning an error from `on_start` aborts startup. Returning an error from `receive` is
/// fatal to the actor: the error is logged and the cell shuts down. A panic in either hook is
/// caught and treated as such an error, so `on_stop` still runs.
#[async_trait]
pub trait Actor: Send + 'static {
    async fn on_start(&mut self, _ctx: &Context) -> Result<(), ActorError> {
        Ok(())
    }

    async fn receive(&mut self, ctx: &Context, message: Message) -> Result<(), ActorError>;

    async fn on_stop(&mut self, _ctx: &Context) {}

    /// Name used in log lines, e.g. `PersistentActor<Account>`.
    fn actor_type(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

#[async_trait]
impl Actor for Box<dyn Actor> {
    async fn on_start(&mut self, ctx: &Context) -> Result<(), ActorError> {
        (**self).on_start(ctx).await
    }

    async fn receive(&mut self, ctx: &Context, message: Message) -> Result<(), ActorError> {
        (**self).receive(ctx, message).await
    }

    async fn on_stop(&mut self, ctx: &Context) {
        (**self).on_stop(ctx).await
    }

    fn actor_type(&self) -> &'static str {
        (**self).actor_type()
    }
}

/// Spawns `actor` with a mailbox of [`DEFAULT_MAILBOX_CAPACITY`].
///
/// Must be called from within a Tokio runtime.
pub fn spawn<A: Actor>(actor: A) -> ActorRef {
    spawn_with_capacity(actor, DEFAULT_MAILBOX_CAPACITY)
}

/// Spawns `actor` with a mailbox holding at most `capacity` pending envelopes. Senders wait
/// while it is full.
pub fn spawn_with_capacity<A: Actor>(actor: A, capacity: usize) -> ActorRef {
    let (mailbox_tx, mailbox_rx) = mpsc::channel(capacity.max(1));
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(CellState::Running);

    let self_ref = ActorRef::new(ActorId::next(), mailbox_tx, control_tx, state_rx);
    let cell = ActorCell {
        actor,
        self_ref: self_ref.clone(),
        mailbox: mailbox_rx,
        control: control_rx,
        state: state_tx,
    };
    tokio::spawn(cell.run());
    self_ref
}

/// Private runtime state backing one actor.
struct ActorCell<A: Actor> {
    actor: A,
    self_ref: ActorRef,
    mailbox: mpsc::Receiver<Envelope>,
    control: mpsc::UnboundedReceiver<SystemMessage>,
    state: watch::Sender<CellState>,
}

impl<A: Actor> ActorCell<A> {
    async fn run(mut self) {
        let actor_type = self.actor.actor_type();
        let id = self.self_ref.id();
        let lifecycle_ctx = Context::new(self.self_ref.clone(), None);

        let started = AssertUnwindSafe(self.actor.on_start(&lifecycle_ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(panicked(payload)));
        match started {
            Ok(()) => {
                info!(actor = %id, actor_type, "Actor started");
                self.process(actor_type).await;
            }
            Err(e) => error!(actor = %id, actor_type, error = %e, "Actor failed to start"),
        }

        if let Err(payload) = AssertUnwindSafe(self.actor.on_stop(&lifecycle_ctx))
            .catch_unwind()
            .await
        {
            error!(actor = %id, actor_type, error = %panicked(payload), "Actor failed to stop");
        }
        self.state.send_replace(CellState::Stopped);
        info!(actor = %id, actor_type, "Actor stopped");
    }

    /// The message loop. Every exit path leads back to `run`, which runs `on_stop` once.
    async fn process(&mut self, actor_type: &'static str) {
        let id = self.self_ref.id();
        loop {
            tokio::select! {
                // Control first: once a stop is observed, no queued message is handled.
                biased;

                Some(SystemMessage::Stop) = self.control.recv() => {
                    debug!(actor = %id, actor_type, "Stop requested");
                    return;
                }
                envelope = self.mailbox.recv() => {
                    let Some(Envelope { sender, message }) = envelope else {
                        return;
                    };
                    let message_type = message.type_name();
                    let ctx = Context::new(self.self_ref.clone(), sender);
                    let handled = AssertUnwindSafe(self.actor.receive(&ctx, message))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| Err(panicked(payload)));
                    if let Err(e) = handled {
                        error!(actor = %id, actor_type, message_type, error = %e, "Actor failed");
                        return;
                    }
                }
            }
        }
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> ActorError {
    let reason = match payload.downcast::<String>() {
        Ok(reason) => *reason,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map_or_else(|| "unknown panic".to_string(), |s| s.to_string()),
    };
    ActorError::Panicked(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::behaviors::FunctionActor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct Hooks {
        started: AtomicUsize,
        received: AtomicUsize,
        stopped: AtomicUsize,
    }

    struct Recording {
        hooks: Arc<Hooks>,
        fail_start: bool,
        panic_start: bool,
    }

    #[async_trait]
    impl Actor for Recording {
        async fn on_start(&mut self, _ctx: &Context) -> Result<(), ActorError> {
            self.hooks.started.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(ActorError::UnexpectedMessage("boom"));
            }
            if self.panic_start {
                panic!("start exploded");
            }
            Ok(())
        }

        async fn receive(&mut self, _ctx: &Context, message: Message) -> Result<(), ActorError> {
            assert_eq!(self.hooks.started.load(Ordering::SeqCst), 1);
            self.hooks.received.fetch_add(1, Ordering::SeqCst);
            if message.is::<&'static str>() {
                return Err(ActorError::EntityError("poison".into()));
            }
            if message.is::<u8>() {
                panic!("receive exploded");
            }
            Ok(())
        }

        async fn on_stop(&mut self, _ctx: &Context) {
            self.hooks.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_hooks_run_once_around_messages() {
        let hooks = Arc::new(Hooks::default());
        let actor = spawn(Recording {
            hooks: hooks.clone(),
            fail_start: false,
            panic_start: false,
        });

        actor.send(1u32).await.unwrap();
        actor.send(2u32).await.unwrap();
        // Nobody replies, so the ask runs out; by then all three were handled.
        let reply = actor.ask_with_timeout(3u32, Duration::from_millis(50)).await;
        assert!(reply.unwrap_err().is_timeout());

        actor.stop();
        actor.stopped().await;

        assert_eq!(hooks.started.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.received.load(Ordering::SeqCst), 3);
        assert_eq!(hooks.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(actor.state(), CellState::Stopped);
    }

    #[tokio::test]
    async fn test_failed_start_skips_messages_but_runs_on_stop() {
        let hooks = Arc::new(Hooks::default());
        let actor = spawn(Recording {
            hooks: hooks.clone(),
            fail_start: true,
            panic_start: false,
        });
        actor.stopped().await;

        assert_eq!(hooks.received.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.stopped.load(Ordering::SeqCst), 1);
        assert!(matches!(actor.send(1u32).await, Err(ActorError::ActorClosed)));
    }

    #[tokio::test]
    async fn test_receive_error_is_fatal() {
        let hooks = Arc::new(Hooks::default());
        let actor = spawn(Recording {
            hooks: hooks.clone(),
            fail_start: false,
            panic_start: false,
        });

        actor.send("poison").await.unwrap();
        actor.stopped().await;

        assert_eq!(hooks.stopped.load(Ordering::SeqCst), 1);
        assert!(matches!(actor.send(1u32).await, Err(ActorError::ActorClosed)));
    }

    #[tokio::test]
    async fn test_panic_in_receive_still_runs_on_stop() {
        let hooks = Arc::new(Hooks::default());
        let actor = spawn(Recording {
            hooks: hooks.clone(),
            fail_start: false,
            panic_start: false,
        });

        actor.send(7u8).await.unwrap();
        actor.stopped().await;

        assert_eq!(hooks.received.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(actor.state(), CellState::Stopped);
        assert!(matches!(actor.send(1u32).await, Err(ActorError::ActorClosed)));
    }

    #[tokio::test]
    async fn test_panic_in_start_still_runs_on_stop() {
        let hooks = Arc::new(Hooks::default());
        let actor = spawn(Recording {
            hooks: hooks.clone(),
            fail_start: false,
            panic_start: true,
        });
        actor.stopped().await;

        assert_eq!(hooks.received.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(actor.state(), CellState::Stopped);
    }

    #[test]
    fn test_panic_payload_becomes_error() {
        let err = panicked(Box::new("plain"));
        assert!(matches!(err, ActorError::Panicked(ref r) if r == "plain"));
        let err = panicked(Box::new(format!("formatted {}", 1)));
        assert!(matches!(err, ActorError::Panicked(ref r) if r == "formatted 1"));
        let err = panicked(Box::new(3u32));
        assert!(matches!(err, ActorError::Panicked(ref r) if r == "unknown panic"));
    }

    #[tokio::test]
    async fn test_stop_discards_queued_messages() {
        let handled = Arc::new(AtomicUsize::new(0));
        let (entered_tx, mut entered_rx) = mpsc::channel::<()>(4);
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
        let gate = Arc::new(tokio::sync::Mutex::new(Some(gate_rx)));

        let counter = handled.clone();
        let actor = spawn(FunctionActor::new(move |_ctx, _message| {
            let counter = counter.clone();
            let gate = gate.clone();
            let entered = entered_tx.clone();
            async move {
                let _ = entered.send(()).await;
                // The first message parks until the test opens the gate.
                if let Some(rx) = gate.lock().await.take() {
                    let _ = rx.await;
                }
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

        actor.send(()).await.unwrap();
        actor.send(()).await.unwrap();
        actor.send(()).await.unwrap();
        entered_rx.recv().await.unwrap();
        actor.stop();
        gate_tx.send(()).unwrap();
        actor.stopped().await;

        // The in-flight message completes; the ones queued behind the stop do not run.
        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }
}
