pub mod event_changes;
pub mod place_changes;
pub mod telemetry;

use message_dispatch::{Disposition, HandlerSet};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::services::broker::ReceiveBackoff;

/// The reusable consumer loop behind every listener.
///
/// One message is in flight at a time: the next message is not received until
/// the current one has been dispatched and its offset committed, which keeps
/// per-queue ordering and bounds memory at the cost of serialized throughput.
/// Both acks and discards advance the offset; a discarded message is gone (no
/// requeue, no dead-letter topic).
pub struct TopicListener<M> {
    name: &'static str,
    consumer: StreamConsumer,
    handlers: HandlerSet<M>,
}

impl<M> TopicListener<M>
where
    M: DeserializeOwned + Send + Sync,
{
    pub fn new(name: &'static str, consumer: StreamConsumer, handlers: HandlerSet<M>) -> Self {
        Self {
            name,
            consumer,
            handlers,
        }
    }

    pub async fn run(self) {
        let mut backoff = ReceiveBackoff::new();
        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    backoff.record_success();

                    let disposition = match message.payload() {
                        None => {
                            warn!(listener = self.name, "Message without payload, discarding");
                            Disposition::Discard
                        }
                        Some(payload) => self.settle(payload).await,
                    };

                    debug!(
                        listener = self.name,
                        topic = message.topic(),
                        offset = message.offset(),
                        ?disposition,
                        "Message settled"
                    );

                    if let Err(e) = self.consumer.commit_message(&message, CommitMode::Sync) {
                        error!(listener = self.name, "Failed to commit offset: {}", e);
                    }
                }
                Err(e) => {
                    let wait = backoff.record_error();
                    error!(
                        listener = self.name,
                        consecutive_errors = backoff.consecutive_errors(),
                        backoff_secs = wait.as_secs(),
                        "Consumer receive error (will retry): {}",
                        e
                    );
                    sleep(wait).await;
                }
            }
        }
    }

    /// Parse + dispatch for one payload. Parse failure is a permanent
    /// discard; the consumer loop itself keeps running.
    async fn settle(&self, payload: &[u8]) -> Disposition {
        match serde_json::from_slice::<M>(payload) {
            Ok(parsed) => self.handlers.dispatch(&parsed).await.disposition(),
            Err(e) => {
                warn!(
                    listener = self.name,
                    "Failed to parse message payload, discarding: {}", e
                );
                Disposition::Discard
            }
        }
    }
}
