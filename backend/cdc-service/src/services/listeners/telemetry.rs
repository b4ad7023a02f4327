use std::sync::Arc;

use async_trait::async_trait;
use message_dispatch::{Disposition, Handler, HandlerSet};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::models::{MobilityStationsMessage, TruckMessage};
use crate::repositories::{MobilityStationSink, TruckPositionSink};
use crate::services::broker::{create_consumer, BrokerConfig, ReceiveBackoff};
use crate::services::listeners::TopicListener;

/// Queue (consumer group) and topic for waste-truck position reports.
pub const TRUCKS_QUEUE: &str = "residuos.camion.festivalverde";

/// Routing key for bike-station telemetry consumed by the global listener.
pub const BIKE_STATIONS_KEY: &str = "movilidad.estacion.bicing";

/// Consumer group of the catch-all listener; it consumes already-existing
/// telemetry topics without declaring anything of its own.
pub const GLOBAL_QUEUE: &str = "cultura_def";

/// Persists truck position reports. Interested in every message on its
/// queue; the upsert keyed on `(event_id, truck_id)` makes redelivery safe.
pub struct TruckPositionHandler {
    sink: Arc<dyn TruckPositionSink>,
}

impl TruckPositionHandler {
    pub fn new(sink: Arc<dyn TruckPositionSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Handler<TruckMessage> for TruckPositionHandler {
    fn name(&self) -> &'static str {
        "truck-position"
    }

    fn can_handle(&self, _message: &TruckMessage) -> bool {
        true
    }

    async fn handle(&self, message: &TruckMessage) -> anyhow::Result<()> {
        info!(
            event_id = %message.event_id,
            truck_id = %message.truck_id,
            lat = message.position.lat,
            long = message.position.long,
            "Truck position received"
        );
        self.sink.save_position(message).await?;
        Ok(())
    }
}

/// Dedicated listener for the waste-truck telemetry queue.
pub fn truck_listener(
    config: &BrokerConfig,
    sink: Arc<dyn TruckPositionSink>,
) -> Result<TopicListener<TruckMessage>> {
    let handlers = HandlerSet::new().register(TruckPositionHandler::new(sink));
    let consumer = create_consumer(config, TRUCKS_QUEUE, &[TRUCKS_QUEUE])?;
    Ok(TopicListener::new("residuos-trucks", consumer, handlers))
}

/// Catch-all listener: one queue fed by several routing keys, dispatched by
/// key. Messages with no registered key are acked so they are not redelivered
/// forever.
pub struct GlobalCdcListener {
    consumer: StreamConsumer,
    trucks: Arc<dyn TruckPositionSink>,
    stations: Arc<dyn MobilityStationSink>,
}

impl GlobalCdcListener {
    pub fn new(
        config: &BrokerConfig,
        trucks: Arc<dyn TruckPositionSink>,
        stations: Arc<dyn MobilityStationSink>,
    ) -> Result<Self> {
        let consumer = create_consumer(config, GLOBAL_QUEUE, &[TRUCKS_QUEUE, BIKE_STATIONS_KEY])?;
        Ok(Self {
            consumer,
            trucks,
            stations,
        })
    }

    pub async fn run(self) {
        info!(
            queue = GLOBAL_QUEUE,
            routing_keys = ?[TRUCKS_QUEUE, BIKE_STATIONS_KEY],
            "Global CDC listener started"
        );

        let mut backoff = ReceiveBackoff::new();
        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    backoff.record_success();

                    let disposition = match message.payload() {
                        None => {
                            warn!("Null payload received on global listener, discarding");
                            Disposition::Discard
                        }
                        Some(payload) => self.settle(message.topic(), payload).await,
                    };

                    debug!(
                        topic = message.topic(),
                        offset = message.offset(),
                        ?disposition,
                        "Global listener settled message"
                    );

                    if let Err(e) = self.consumer.commit_message(&message, CommitMode::Sync) {
                        error!("Global listener failed to commit offset: {}", e);
                    }
                }
                Err(e) => {
                    let wait = backoff.record_error();
                    error!(
                        backoff_secs = wait.as_secs(),
                        "Global listener receive error (will retry): {}", e
                    );
                    sleep(wait).await;
                }
            }
        }
    }

    /// Routing-key keyed dispatch. Split out of the loop so the settlement
    /// semantics are testable without a broker.
    async fn settle(&self, routing_key: &str, payload: &[u8]) -> Disposition {
        match routing_key {
            TRUCKS_QUEUE => self.settle_truck(payload).await,
            BIKE_STATIONS_KEY => self.settle_stations(payload).await,
            other => {
                debug!(
                    routing_key = other,
                    "No handler registered for routing key, acking"
                );
                Disposition::Ack
            }
        }
    }

    async fn settle_truck(&self, payload: &[u8]) -> Disposition {
        let parsed: TruckMessage = match serde_json::from_slice(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Failed to parse truck message, discarding: {}", e);
                return Disposition::Discard;
            }
        };

        match self.trucks.save_position(&parsed).await {
            Ok(()) => Disposition::Ack,
            Err(e) => {
                error!(
                    event_id = %parsed.event_id,
                    truck_id = %parsed.truck_id,
                    "Failed to persist truck position, discarding: {}",
                    e
                );
                Disposition::Discard
            }
        }
    }

    async fn settle_stations(&self, payload: &[u8]) -> Disposition {
        let parsed: MobilityStationsMessage = match serde_json::from_slice(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Failed to parse mobility stations message, discarding: {}", e);
                return Disposition::Discard;
            }
        };

        match self.stations.save_stations(&parsed).await {
            Ok(()) => {
                info!(
                    event_id = %parsed.event_id,
                    stations = parsed.stations.len(),
                    "Mobility stations persisted"
                );
                Disposition::Ack
            }
            Err(e) => {
                error!(
                    event_id = %parsed.event_id,
                    "Failed to persist mobility stations, discarding: {}",
                    e
                );
                Disposition::Discard
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::models::telemetry::Position;
    use crate::models::MobilityStation;

    /// In-memory sink with the same upsert contract as the Postgres
    /// repository: match on natural key, set fields.
    #[derive(Default)]
    struct MemoryTrucks {
        rows: Mutex<HashMap<(String, String), Position>>,
    }

    #[async_trait]
    impl TruckPositionSink for MemoryTrucks {
        async fn save_position(&self, message: &TruckMessage) -> Result<()> {
            self.rows.lock().unwrap().insert(
                (message.event_id.clone(), message.truck_id.clone()),
                message.position.clone(),
            );
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryStations {
        rows: Mutex<HashMap<(String, String), MobilityStation>>,
    }

    #[async_trait]
    impl MobilityStationSink for MemoryStations {
        async fn save_stations(&self, message: &MobilityStationsMessage) -> Result<()> {
            let mut rows = self.rows.lock().unwrap();
            for station in &message.stations {
                rows.insert(
                    (message.event_id.clone(), station.station_id.clone()),
                    station.clone(),
                );
            }
            Ok(())
        }
    }

    fn listener(
        trucks: Arc<MemoryTrucks>,
        stations: Arc<MemoryStations>,
    ) -> GlobalCdcListener {
        let config = BrokerConfig {
            brokers: "localhost:1".to_string(),
        };
        GlobalCdcListener {
            consumer: create_consumer(&config, "test-global", &[TRUCKS_QUEUE])
                .expect("consumer construction is lazy"),
            trucks,
            stations,
        }
    }

    fn truck_payload(event: &str, truck: &str, lat: f64) -> Vec<u8> {
        format!(
            r#"{{"eventId":"{event}","truckId":"{truck}","position":{{"lat":{lat},"long":-58.4}}}}"#
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn duplicate_truck_updates_converge_to_one_record() {
        let trucks = Arc::new(MemoryTrucks::default());
        let listener = listener(Arc::clone(&trucks), Arc::new(MemoryStations::default()));

        let first = listener
            .settle(TRUCKS_QUEUE, &truck_payload("ev-1", "t-1", -34.1))
            .await;
        let second = listener
            .settle(TRUCKS_QUEUE, &truck_payload("ev-1", "t-1", -34.9))
            .await;

        assert_eq!(first, Disposition::Ack);
        assert_eq!(second, Disposition::Ack);

        let rows = trucks.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        let position = rows
            .get(&("ev-1".to_string(), "t-1".to_string()))
            .expect("record exists");
        assert!((position.lat + 34.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn malformed_payload_is_discarded_and_loop_survives() {
        let trucks = Arc::new(MemoryTrucks::default());
        let listener = listener(Arc::clone(&trucks), Arc::new(MemoryStations::default()));

        let bad = listener.settle(TRUCKS_QUEUE, b"not json").await;
        assert_eq!(bad, Disposition::Discard);

        // A valid message on the same queue is still processed afterwards.
        let good = listener
            .settle(TRUCKS_QUEUE, &truck_payload("ev-1", "t-1", -34.1))
            .await;
        assert_eq!(good, Disposition::Ack);
        assert_eq!(trucks.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_routing_key_is_acked_without_writes() {
        let trucks = Arc::new(MemoryTrucks::default());
        let stations = Arc::new(MemoryStations::default());
        let listener = listener(Arc::clone(&trucks), Arc::clone(&stations));

        let disposition = listener
            .settle("cultura.evento.festivalverde", b"{}")
            .await;

        assert_eq!(disposition, Disposition::Ack);
        assert!(trucks.rows.lock().unwrap().is_empty());
        assert!(stations.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn station_snapshot_upserts_by_station_key() {
        let stations = Arc::new(MemoryStations::default());
        let listener = listener(Arc::new(MemoryTrucks::default()), Arc::clone(&stations));

        let payload = serde_json::json!({
            "eventId": "ev-1",
            "stations": [
                {"stationId": "st-1", "name": "A", "location": {"type": "Point", "coordinates": [0.0, 0.0]}, "capacity": 10, "bikesCount": 3, "status": "IN_SERVICE"},
                {"stationId": "st-1", "name": "A", "location": {"type": "Point", "coordinates": [0.0, 0.0]}, "capacity": 10, "bikesCount": 5, "status": "IN_SERVICE"}
            ],
            "metadata": {"mode": "bulk", "sentAt": "2025-01-15T12:00:00Z", "totalStations": 2}
        })
        .to_string();

        let disposition = listener.settle(BIKE_STATIONS_KEY, payload.as_bytes()).await;
        assert_eq!(disposition, Disposition::Ack);

        let rows = stations.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        let station = rows
            .get(&("ev-1".to_string(), "st-1".to_string()))
            .expect("record exists");
        assert_eq!(station.bikes_count, 5);
    }
}
