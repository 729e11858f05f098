//! # Messages & Envelopes
//!
//! Every mailbox in the runtime carries [`Envelope`]s: an optional sender plus an opaque
//! [`Message`] payload. Actors recover the concrete payload type with
//! [`Message::downcast`] / [`Message::downcast_ref`].

use crate::framework::actor_ref::ActorRef;
use std::any::Any;
use std::fmt;

/// An opaque, owned message payload.
///
/// Any `Send + 'static` value can be carried. Wrapping a `Message` in another `Message`
/// returns the original unchanged, so forwarding a received message never double-boxes it.
pub struct Message {
    payload: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl Message {
    pub fn new<T: Any + Send>(payload: T) -> Self {
        let type_name = std::any::type_name::<T>();
        let boxed: Box<dyn Any + Send> = Box::new(payload);
        match boxed.downcast::<Message>() {
            Ok(message) => *message,
            Err(payload) => Self { payload, type_name },
        }
    }

    /// Returns `true` if the payload is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Takes the payload out as a `T`, handing the message back untouched on mismatch.
    pub fn downcast<T: Any>(self) -> Result<T, Message> {
        let type_name = self.type_name;
        match self.payload.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(payload) => Err(Self { payload, type_name }),
        }
    }

    /// Short type name of the payload (e.g. `Deposit` instead of `my_crate::bank::Deposit`).
    pub fn type_name(&self) -> &'static str {
        short_type_name(self.type_name)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("type", &self.type_name())
            .finish_non_exhaustive()
    }
}

/// What actually travels through a mailbox.
///
/// A missing `sender` means fire-and-forget; replying to such a message does nothing.
#[derive(Debug)]
pub struct Envelope {
    pub sender: Option<ActorRef>,
    pub message: Message,
}

/// Lifecycle commands delivered on the control channel, out of band from user messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMessage {
    Stop,
}

/// Strips the module path from a type name, keeping generic arguments readable.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}
