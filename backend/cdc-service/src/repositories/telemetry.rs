use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{MobilityStationsMessage, TruckMessage};

/// Idempotent sink for truck position reports.
///
/// Every write is "match on natural key, set fields" with upsert semantics:
/// duplicate or out-of-order delivery of the same logical update converges to
/// one record, last write wins.
#[async_trait]
pub trait TruckPositionSink: Send + Sync {
    async fn save_position(&self, message: &TruckMessage) -> Result<()>;
}

/// Idempotent sink for bike-station snapshots, keyed on
/// `(event_id, station_id)`.
#[async_trait]
pub trait MobilityStationSink: Send + Sync {
    async fn save_stations(&self, message: &MobilityStationsMessage) -> Result<()>;
}

pub struct TruckRepository {
    pool: PgPool,
}

impl TruckRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TruckPositionSink for TruckRepository {
    async fn save_position(&self, message: &TruckMessage) -> Result<()> {
        sqlx::query(
            "INSERT INTO trucks (event_id, truck_id, lat, long, updated_at) \
             VALUES ($1, $2, $3, $4, now()) \
             ON CONFLICT (event_id, truck_id) \
             DO UPDATE SET lat = excluded.lat, long = excluded.long, updated_at = now()",
        )
        .bind(&message.event_id)
        .bind(&message.truck_id)
        .bind(message.position.lat)
        .bind(message.position.long)
        .execute(&self.pool)
        .await?;

        debug!(
            event_id = %message.event_id,
            truck_id = %message.truck_id,
            "Truck position upserted"
        );
        Ok(())
    }
}

pub struct MobilityStationRepository {
    pool: PgPool,
}

impl MobilityStationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MobilityStationSink for MobilityStationRepository {
    async fn save_stations(&self, message: &MobilityStationsMessage) -> Result<()> {
        for station in &message.stations {
            sqlx::query(
                "INSERT INTO mobility_stations \
                    (event_id, station_id, name, location, capacity, bikes_count, status, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, now()) \
                 ON CONFLICT (event_id, station_id) \
                 DO UPDATE SET name = excluded.name, \
                               location = excluded.location, \
                               capacity = excluded.capacity, \
                               bikes_count = excluded.bikes_count, \
                               status = excluded.status, \
                               updated_at = now()",
            )
            .bind(&message.event_id)
            .bind(&station.station_id)
            .bind(&station.name)
            .bind(&station.location)
            .bind(station.capacity)
            .bind(station.bikes_count)
            .bind(&station.status)
            .execute(&self.pool)
            .await?;
        }

        info!(
            event_id = %message.event_id,
            stations = message.stations.len(),
            mode = %message.metadata.mode,
            "Mobility stations upserted"
        );
        Ok(())
    }
}
