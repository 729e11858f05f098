//! # Event Sources & Streams
//!
//! A read side pulls events instead of having them pushed. [`EventSource`] is the pull end;
//! [`EventStream`] drives a source on its own task and delivers every event into an actor's
//! mailbox, so projection code still runs one message at a time.

use crate::framework::ActorRef;
use crate::persistence::{PersistenceProvider, PersistentEvent, StorageError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default pause between polls when the next event has not been written yet.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A lazy, ordered sequence of events. `None` ends the sequence.
#[async_trait]
pub trait EventSource<E>: Send + 'static {
    async fn next_event(&mut self) -> Option<PersistentEvent<E>>;
}

/// Polls one entity's log for the next expected sequence number, forever.
///
/// Events come out in strict sequence order with no gaps and no duplicates. When the next
/// event is missing the source sleeps for the poll interval and asks again; provider errors
/// are logged and treated the same way.
pub struct ProviderEventSource<E: Send + 'static> {
    provider: Arc<dyn PersistenceProvider<E>>,
    persistence_id: String,
    next_sequence_id: u64,
    poll_interval: Duration,
}

impl<E: Send + 'static> ProviderEventSource<E> {
    pub fn new(
        provider: Arc<dyn PersistenceProvider<E>>,
        persistence_id: impl Into<String>,
        start_sequence_id: u64,
    ) -> Self {
        Self {
            provider,
            persistence_id: persistence_id.into(),
            next_sequence_id: start_sequence_id,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl<E: Send + 'static> EventSource<E> for ProviderEventSource<E> {
    async fn next_event(&mut self) -> Option<PersistentEvent<E>> {
        loop {
            match self
                .provider
                .get_event(&self.persistence_id, self.next_sequence_id)
                .await
            {
                Ok(event) => {
                    self.next_sequence_id += 1;
                    return Some(event);
                }
                Err(StorageError::NotFound) => {}
                Err(e) => warn!(
                    persistence_id = %self.persistence_id,
                    sequence_id = self.next_sequence_id,
                    error = %e,
                    "Event poll failed"
                ),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// A running source attached to an actor.
///
/// Closing (or dropping) the stream ends the background task, including any pending poll.
pub struct EventStream {
    close: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl EventStream {
    /// Starts pulling from `source` and sending each event to `sink`.
    ///
    /// The task also ends when the source is exhausted or the sink has stopped.
    pub fn open<E: Send + 'static>(mut source: Box<dyn EventSource<E>>, sink: ActorRef) -> Self {
        let (close, closed) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let sink_id = sink.id();
            let pump = async {
                while let Some(event) = source.next_event().await {
                    if sink.send(event).await.is_err() {
                        break;
                    }
                }
            };
            tokio::select! {
                _ = closed => {}
                _ = pump => {}
            }
            debug!(sink = %sink_id, "Event stream finished");
        });
        Self {
            close: Some(close),
            task,
        }
    }

    pub fn close(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
