//! # Read Sides
//!
//! A read side keeps a queryable view of one entity's event log, tracked by its own offset.
//!
//! ## Flow
//! 1. `on_start` reads the offset for [`ReadSideHandler::offset_name`] and opens an
//!    [`EventStream`] from that position, with the actor itself as the sink.
//! 2. Each [`PersistentEvent`] arriving in the mailbox is mapped to a mutation, merged with
//!    the offset advance to `sequence_id + 1` and executed as one batch.
//! 3. A failed batch is retried after a fixed delay until it succeeds. The mailbox waits
//!    meanwhile, and the mapping must tolerate being applied again.
//! 4. `on_stop` closes the stream.

pub mod event_source;

pub use event_source::{EventSource, EventStream, ProviderEventSource, DEFAULT_POLL_INTERVAL};

use crate::framework::{Actor, ActorError, Context, Message};
use crate::persistence::{BatchableQuery, PersistentEvent, SequenceTracker, StorageError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

/// Delay between attempts at a failed read-side update, unless
/// [`ReadSideActor::with_retry_delay`] says otherwise.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Domain half of a read side: where the events come from and how each one becomes a write.
#[async_trait]
pub trait ReadSideHandler: Send + 'static {
    type Event: Clone + Send + Sync + 'static;
    type Mutation: BatchableQuery;

    /// Name of the offset tracking this projection.
    fn offset_name(&self) -> String;

    /// A source yielding events from `start_sequence_id` on.
    fn event_source(&self, start_sequence_id: u64) -> Box<dyn EventSource<Self::Event>>;

    /// Maps one event to the view update it implies. May be called more than once for the
    /// same event.
    async fn read_event(
        &mut self,
        event: &PersistentEvent<Self::Event>,
    ) -> Result<Self::Mutation, StorageError>;
}

/// Runs a [`ReadSideHandler`] as an [`Actor`].
pub struct ReadSideActor<H: ReadSideHandler> {
    handler: H,
    tracker: Arc<dyn SequenceTracker<Mutation = H::Mutation>>,
    retry_delay: Duration,
    offset_name: String,
    stream: Option<EventStream>,
}

impl<H: ReadSideHandler> ReadSideActor<H> {
    pub fn new(handler: H, tracker: Arc<dyn SequenceTracker<Mutation = H::Mutation>>) -> Self {
        let offset_name = handler.offset_name();
        Self {
            handler,
            tracker,
            retry_delay: DEFAULT_RETRY_DELAY,
            offset_name,
            stream: None,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    async fn apply(&mut self, event: &PersistentEvent<H::Event>) -> Result<(), StorageError> {
        let mutation = self.handler.read_event(event).await?;
        let advance = self
            .tracker
            .update_sequence(&self.offset_name, event.sequence_id + 1);
        mutation.merge(advance).execute().await
    }

    /// Applies `event`, retrying until it lands.
    async fn project(&mut self, event: &PersistentEvent<H::Event>) {
        let mut attempt = 1u32;
        while let Err(e) = self.apply(event).await {
            warn!(attempt, error = %e, "Read side update failed, retrying");
            tokio::time::sleep(self.retry_delay).await;
            attempt += 1;
        }
        debug!("Read side updated");
    }
}

#[async_trait]
impl<H: ReadSideHandler> Actor for ReadSideActor<H> {
    async fn on_start(&mut self, ctx: &Context) -> Result<(), ActorError> {
        let offset = self
            .tracker
            .get_sequence_id(&self.offset_name)
            .await
            .map_err(|source| ActorError::Offset {
                offset_name: self.offset_name.clone(),
                source,
            })?;

        let source = self.handler.event_source(offset);
        self.stream = Some(EventStream::open(source, ctx.self_ref().clone()));
        info!(offset_name = %self.offset_name, offset, "Read side started");
        Ok(())
    }

    async fn receive(&mut self, _ctx: &Context, message: Message) -> Result<(), ActorError> {
        let event = match message.downcast::<PersistentEvent<H::Event>>() {
            Ok(event) => event,
            Err(other) => {
                debug!(
                    offset_name = %self.offset_name,
                    message_type = other.type_name(),
                    "Ignoring non-event message"
                );
                return Ok(());
            }
        };

        let span = info_span!(
            "project",
            offset_name = %self.offset_name,
            sequence_id = event.sequence_id
        );
        self.project(&event).instrument(span).await;
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &Context) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
    }
}
