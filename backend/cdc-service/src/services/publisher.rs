use std::time::Duration;

use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::debug;

use crate::error::{CdcError, Result};
use crate::models::{ChangeEvent, ChangeOperation};
use crate::services::broker::{create_producer, BrokerConfig};

const CAPTURE_DOMAIN: &str = "cultura";

/// Publishes normalized change events to the broker.
///
/// Topic names follow the original routing-key contract
/// `cultura.<collection>.<crear|modificar>`. Messages are UTF-8 JSON, keyed
/// by document id and produced with `acks=all`.
#[derive(Clone)]
pub struct EventPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl EventPublisher {
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        Ok(Self {
            producer: create_producer(config)?,
            timeout: Duration::from_secs(5),
        })
    }

    pub fn routing_key(collection: &str, operation: &ChangeOperation) -> String {
        format!(
            "{CAPTURE_DOMAIN}.{collection}.{verb}",
            verb = operation.routing_verb()
        )
    }

    /// Publishes one change event. Errors surface to the caller, who decides
    /// whether to drop or retry; the capture loop logs and continues.
    pub async fn publish(&self, collection: &str, event: &ChangeEvent) -> Result<()> {
        let topic = Self::routing_key(collection, &event.event_type);
        let payload = serde_json::to_string(event)?;

        self.send(&topic, &event.document_id, &payload).await?;

        debug!(
            topic,
            document_id = %event.document_id,
            "Change event published"
        );
        Ok(())
    }

    async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<()> {
        let record = FutureRecord::to(topic).key(key).payload(payload);
        self.producer
            .send(record, self.timeout)
            .await
            .map_err(|(e, _)| CdcError::from(e))?;
        Ok(())
    }
}
