use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sqlx::postgres::PgListener;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::models::{ChangeEvent, ChangeOperation};
use crate::repositories::CatalogReader;
use crate::services::publisher::EventPublisher;

/// Postgres NOTIFY channel fed by the row triggers on watched tables.
const CDC_CHANNEL: &str = "cdc_changes";

/// Raw store-level mutation notification, before normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawChange {
    /// Wire collection name (e.g. `culturalplaces`), set by the trigger.
    pub table: String,
    /// Raw lowercase operation code (insert/update/delete).
    pub op: String,
    pub id: String,
    #[serde(rename = "updatedFields")]
    pub updated_fields: Option<Map<String, Value>>,
}

/// Source of raw change notifications. Production uses LISTEN/NOTIFY; tests
/// drive the watcher with an in-memory queue.
#[async_trait]
pub trait ChangeSource: Send {
    /// Next raw change, or `None` when the source is exhausted.
    async fn next_change(&mut self) -> Option<RawChange>;
}

/// LISTEN/NOTIFY-backed change source.
pub struct PgChangeSource {
    listener: PgListener,
}

impl PgChangeSource {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let mut listener = PgListener::connect(database_url).await?;
        listener.listen(CDC_CHANNEL).await?;
        info!(channel = CDC_CHANNEL, "Change stream listener started");
        Ok(Self { listener })
    }
}

#[async_trait]
impl ChangeSource for PgChangeSource {
    async fn next_change(&mut self) -> Option<RawChange> {
        loop {
            match self.listener.recv().await {
                Ok(notification) => match serde_json::from_str(notification.payload()) {
                    Ok(change) => return Some(change),
                    Err(e) => {
                        warn!("Malformed change notification, skipping: {}", e);
                    }
                },
                Err(e) => {
                    // PgListener re-establishes the connection on the next
                    // recv; log and keep listening.
                    error!("Change stream connection error: {}", e);
                }
            }
        }
    }
}

/// Converts raw mutation notifications into canonical change events and
/// republishes them.
///
/// A failure on one record is logged per collection and never stops the
/// watcher for other records or collections. Publish failures are swallowed
/// the same way: missed publication is possible and is not retried.
pub struct ChangeStreamWatcher {
    reader: Arc<dyn CatalogReader>,
    publisher: EventPublisher,
}

impl ChangeStreamWatcher {
    pub fn new(reader: Arc<dyn CatalogReader>, publisher: EventPublisher) -> Self {
        Self { reader, publisher }
    }

    pub async fn run<S: ChangeSource>(&self, mut source: S) {
        info!("Change stream watcher running");
        while let Some(change) = source.next_change().await {
            let collection = change.table.clone();
            if let Err(e) = self.process(change).await {
                error!(collection, "Error processing change: {}", e);
            }
        }
        info!("Change stream source closed");
    }

    /// Normalizes one raw change and publishes it.
    pub async fn process(&self, change: RawChange) -> Result<()> {
        let event = self.normalize(&change).await?;
        self.publisher.publish(&change.table, &event).await
    }

    async fn normalize(&self, change: &RawChange) -> Result<ChangeEvent> {
        let operation = ChangeOperation::from_raw(&change.op);

        // Deletions carry only the document key; there is nothing left to
        // re-fetch.
        if operation == ChangeOperation::Delete {
            return Ok(ChangeEvent::new(
                &change.table,
                operation,
                &change.id,
                Some(json!({ "_id": change.id })),
                None,
            ));
        }

        let data = self.reader.fetch_document(&change.table, &change.id).await?;

        // Trigger payloads key the changed-field map by physical column name;
        // downstream handlers match on the camelCase wire names.
        let updated_fields = change.updated_fields.as_ref().map(|fields| {
            fields
                .iter()
                .map(|(key, value)| (camelize(key), value.clone()))
                .collect()
        });

        Ok(ChangeEvent::new(
            &change.table,
            operation,
            &change.id,
            data,
            updated_fields,
        ))
    }
}

/// snake_case column name to camelCase wire field. A leading underscore is
/// preserved so keys like `_id` pass through untouched.
fn camelize(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for (i, ch) in key.chars().enumerate() {
        if ch == '_' && i > 0 {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}
