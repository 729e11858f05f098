//! # Built-in Behaviors
//!
//! Two small [`Actor`] implementations that show up everywhere: a closure-backed actor and a
//! channel sink used by `ask` to collect replies.

use crate::framework::actor::Actor;
use crate::framework::context::Context;
use crate::framework::error::ActorError;
use crate::framework::message::Message;
use async_trait::async_trait;
use std::future::Future;
use tokio::sync::mpsc;

/// An actor whose `receive` is a closure.
///
/// The closure gets an owned [`Context`] and the message, and returns the future to run.
pub struct FunctionActor<F> {
    receiver: F,
}

impl<F, Fut> FunctionActor<F>
where
    F: FnMut(Context, Message) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), ActorError>> + Send + 'static,
{
    pub fn new(receiver: F) -> Self {
        Self { receiver }
    }
}

#[async_trait]
impl<F, Fut> Actor for FunctionActor<F>
where
    F: FnMut(Context, Message) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), ActorError>> + Send + 'static,
{
    async fn receive(&mut self, ctx: &Context, message: Message) -> Result<(), ActorError> {
        (self.receiver)(ctx.clone(), message).await
    }
}

/// An actor that pushes every message it receives into a Tokio channel.
///
/// Once the receiving half is dropped the sink has nowhere to deliver, and the actor stops.
pub struct ChannelActor {
    output: mpsc::Sender<Message>,
}

impl ChannelActor {
    pub fn new(output: mpsc::Sender<Message>) -> Self {
        Self { output }
    }
}

#[async_trait]
impl Actor for ChannelActor {
    async fn receive(&mut self, _ctx: &Context, message: Message) -> Result<(), ActorError> {
        self.output
            .send(message)
            .await
            .map_err(|_| ActorError::ActorClosed)
    }
}
