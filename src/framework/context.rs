//! # Actor Context
//!
//! The [`Context`] handed to every lifecycle hook: who am I, who sent the current message,
//! and how to answer or pass it on.

use crate::framework::actor_ref::ActorRef;
use crate::framework::error::ActorError;
use std::any::Any;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Context {
    self_ref: ActorRef,
    sender: Option<ActorRef>,
}

impl Context {
    pub(crate) fn new(self_ref: ActorRef, sender: Option<ActorRef>) -> Self {
        Self { self_ref, sender }
    }

    pub fn self_ref(&self) -> &ActorRef {
        &self.self_ref
    }

    /// Sender of the message being handled; `None` for fire-and-forget and lifecycle hooks.
    pub fn sender(&self) -> Option<&ActorRef> {
        self.sender.as_ref()
    }

    /// Sends `payload` to the current sender, from this actor.
    ///
    /// Replying to a fire-and-forget message is a no-op.
    pub async fn reply(&self, payload: impl Any + Send) -> Result<(), ActorError> {
        match &self.sender {
            Some(sender) => {
                sender
                    .send_from(payload, Some(self.self_ref.clone()))
                    .await
            }
            None => {
                debug!(actor = %self.self_ref.id(), "Reply without sender dropped");
                Ok(())
            }
        }
    }

    /// Sends `payload` to `target` keeping the *original* sender, so a reply from the end
    /// of a routing chain reaches whoever started it.
    pub async fn forward(
        &self,
        payload: impl Any + Send,
        target: &ActorRef,
    ) -> Result<(), ActorError> {
        target.send_from(payload, self.sender.clone()).await
    }
}
