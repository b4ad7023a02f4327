use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::FutureProducer;
use tracing::{error, info};

use crate::error::{CdcError, Result};

/// Broker connection settings shared by the publisher and every listener.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Kafka brokers (comma-separated)
    pub brokers: String,
}

impl BrokerConfig {
    pub fn from_env() -> Self {
        Self {
            brokers: std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "kafka:9092".to_string()),
        }
    }
}

/// Creates a producer with the persistence settings the capture leg relies
/// on (`acks=all`).
pub fn create_producer(config: &BrokerConfig) -> Result<FutureProducer> {
    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("message.timeout.ms", "5000")
        .set("acks", "all")
        .create()
        .map_err(|e| {
            error!("Failed to create Kafka producer: {}", e);
            CdcError::from(e)
        })?;

    Ok(producer)
}

/// Creates a consumer for one listener role: its own connection, manual
/// offset commits (the ack/nack seam), and a dedicated group named after the
/// original queue. Each listener processes strictly one message at a time.
pub fn create_consumer(
    config: &BrokerConfig,
    group_id: &str,
    topics: &[&str],
) -> Result<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("group.id", group_id)
        .set("bootstrap.servers", &config.brokers)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("session.timeout.ms", "30000")
        .set("enable.partition.eof", "false")
        .create()
        .map_err(|e| {
            error!("Failed to create Kafka consumer for '{}': {}", group_id, e);
            CdcError::from(e)
        })?;

    consumer.subscribe(topics).map_err(|e| {
        error!("Failed to subscribe '{}' to {:?}: {}", group_id, topics, e);
        CdcError::from(e)
    })?;

    info!(group_id, ?topics, "Consumer subscribed");
    Ok(consumer)
}

/// Exponential backoff applied when a consumer's receive fails repeatedly.
/// Message-level failures never back off; only connection-level errors do.
pub struct ReceiveBackoff {
    consecutive: u32,
}

impl Default for ReceiveBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveBackoff {
    const MAX_BACKOFF_SECS: u64 = 60;

    pub fn new() -> Self {
        Self { consecutive: 0 }
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Records a failure and returns how long to wait before retrying.
    pub fn record_error(&mut self) -> Duration {
        self.consecutive = self.consecutive.saturating_add(1);
        let secs = 2u64
            .saturating_pow(self.consecutive.saturating_sub(1))
            .min(Self::MAX_BACKOFF_SECS);
        Duration::from_secs(secs)
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive
    }
}
