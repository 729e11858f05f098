//! # Actor References
//!
//! An [`ActorRef`] is the only way to talk to an actor. It is cheap to clone (a few channel
//! handles) and can be shared freely across tasks. Holding one does not keep the actor alive
//! past an explicit [`ActorRef::stop`].

use crate::framework::actor::spawn;
use crate::framework::behaviors::ChannelActor;
use crate::framework::error::ActorError;
use crate::framework::message::{Envelope, Message, SystemMessage};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Deadline used by [`ActorRef::ask`].
pub const DEFAULT_ASK_TIMEOUT: Duration = Duration::from_secs(3);

static NEXT_ACTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one actor cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(u64);

impl ActorId {
    pub(crate) fn next() -> Self {
        ActorId(NEXT_ACTOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.0)
    }
}

/// Lifecycle state of an actor cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Stopped,
    Running,
}

/// Handle addressing exactly one actor's mailbox.
#[derive(Clone)]
pub struct ActorRef {
    id: ActorId,
    mailbox: mpsc::Sender<Envelope>,
    control: mpsc::UnboundedSender<SystemMessage>,
    state: watch::Receiver<CellState>,
}

impl ActorRef {
    pub(crate) fn new(
        id: ActorId,
        mailbox: mpsc::Sender<Envelope>,
        control: mpsc::UnboundedSender<SystemMessage>,
        state: watch::Receiver<CellState>,
    ) -> Self {
        Self {
            id,
            mailbox,
            control,
            state,
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Fire-and-forget send. Waits while the target's mailbox is full.
    pub async fn send(&self, message: impl Any + Send) -> Result<(), ActorError> {
        self.send_from(message, None).await
    }

    /// Sends with an explicit reply address. Waits while the target's mailbox is full.
    pub async fn send_from(
        &self,
        message: impl Any + Send,
        sender: Option<ActorRef>,
    ) -> Result<(), ActorError> {
        let envelope = Envelope {
            sender,
            message: Message::new(message),
        };
        self.mailbox
            .send(envelope)
            .await
            .map_err(|_| ActorError::ActorClosed)
    }

    /// Request/reply with the default deadline of [`DEFAULT_ASK_TIMEOUT`].
    ///
    /// This does not read [`RuntimeConfig`](crate::runtime::RuntimeConfig). To honor a
    /// configured deadline, pass `config.ask_timeout()` to [`ActorRef::ask_with_timeout`].
    pub async fn ask(&self, message: impl Any + Send) -> Result<Message, ActorError> {
        self.ask_with_timeout(message, DEFAULT_ASK_TIMEOUT).await
    }

    /// Request/reply through a disposable collector actor.
    ///
    /// The collector is stopped before this returns, whether or not a reply arrived, so a
    /// late reply is never observed. Expiry yields [`ActorError::AskTimeout`]; the request
    /// itself is not cancelled.
    pub async fn ask_with_timeout(
        &self,
        message: impl Any + Send,
        timeout: Duration,
    ) -> Result<Message, ActorError> {
        let (output, mut replies) = mpsc::channel(1);
        let collector = spawn(ChannelActor::new(output));

        let exchange = async {
            self.send_from(message, Some(collector.clone())).await?;
            replies.recv().await.ok_or(ActorError::ActorClosed)
        };
        let result = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                debug!(actor = %self.id, ?timeout, "Ask timed out");
                Err(ActorError::AskTimeout(timeout))
            }
        };

        collector.stop();
        result
    }

    /// Requests termination. Messages already being handled finish first; nothing queued
    /// behind the request is processed.
    pub fn stop(&self) {
        // An already-stopped actor has dropped its control receiver.
        let _ = self.control.send(SystemMessage::Stop);
    }

    pub fn state(&self) -> CellState {
        *self.state.borrow()
    }

    /// Resolves once the actor has run `on_stop` and exited.
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        // The cell publishes `Stopped` before dropping the sender, so an error here also
        // means the actor is gone.
        let _ = state.wait_for(|s| *s == CellState::Stopped).await;
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ActorRef {}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActorRef").field(&self.id).finish()
    }
}
