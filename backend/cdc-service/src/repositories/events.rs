use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CdcError, Result};

/// Target state for a cascading status update over a place's events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeUpdate {
    pub status: String,
    pub is_active: bool,
}

impl CascadeUpdate {
    pub fn new(status: &str, is_active: bool) -> Self {
        Self {
            status: status.to_string(),
            is_active,
        }
    }
}

/// Side condition attached to a cascade so that re-applying the same update
/// after a duplicate delivery modifies zero further rows.
#[derive(Debug, Clone, PartialEq)]
pub enum CascadeGuard {
    /// `status <> target OR is_active <> target`: rows already converged to
    /// the target state are excluded.
    NotAlreadyApplied,
    /// `is_active AND date BETWEEN start AND end`: already-paused rows are
    /// excluded, and only events scheduled inside the window are touched.
    ActiveInWindow {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

/// Guarded bulk updates over the events related to a cultural place.
#[async_trait]
pub trait EventCatalog: Send + Sync {
    /// Applies `update` to every event of `place_id` that passes `guard`.
    /// Returns the number of rows actually modified.
    async fn update_events_by_place(
        &self,
        place_id: &str,
        update: &CascadeUpdate,
        guard: &CascadeGuard,
    ) -> Result<u64>;
}

/// Read-by-id with relation projection, used by the change normalizer to
/// re-fetch and denormalize ("populate") the affected record.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Returns the document as plain JSON, or `None` when the collection is
    /// unknown or the row no longer exists.
    async fn fetch_document(&self, collection: &str, id: &str) -> Result<Option<Value>>;
}

/// sqlx-backed implementation of both catalog traits.
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_id(id: &str) -> Result<Uuid> {
        id.parse()
            .map_err(|_| CdcError::Validation(format!("Invalid document id '{id}'")))
    }
}

#[async_trait]
impl EventCatalog for PgCatalog {
    async fn update_events_by_place(
        &self,
        place_id: &str,
        update: &CascadeUpdate,
        guard: &CascadeGuard,
    ) -> Result<u64> {
        let place = Self::parse_id(place_id)?;

        let result = match guard {
            CascadeGuard::NotAlreadyApplied => {
                sqlx::query(
                    "UPDATE events \
                     SET status = $2, is_active = $3, updated_at = now() \
                     WHERE cultural_place_id = $1 \
                       AND (status <> $2 OR is_active <> $3)",
                )
                .bind(place)
                .bind(&update.status)
                .bind(update.is_active)
                .execute(&self.pool)
                .await?
            }
            CascadeGuard::ActiveInWindow { start, end } => {
                sqlx::query(
                    "UPDATE events \
                     SET status = $2, is_active = $3, updated_at = now() \
                     WHERE cultural_place_id = $1 \
                       AND is_active \
                       AND date >= $4 AND date <= $5",
                )
                .bind(place)
                .bind(&update.status)
                .bind(update.is_active)
                .bind(start)
                .bind(end)
                .execute(&self.pool)
                .await?
            }
        };

        debug!(
            place_id,
            status = %update.status,
            modified = result.rows_affected(),
            "Cascade update applied"
        );
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CatalogReader for PgCatalog {
    async fn fetch_document(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let doc_id = Self::parse_id(id)?;

        // Each query builds the wire document server-side, including the
        // projected relation subset, so only plain JSON leaves this layer.
        let sql = match collection {
            "culturalplaces" => {
                "SELECT json_build_object(
                    '_id', p.id,
                    'name', p.name,
                    'description', p.description,
                    'category', p.category,
                    'characteristics', p.characteristics,
                    'contact', p.contact,
                    'image', p.image,
                    'rating', p.rating,
                    'status', p.status,
                    'isActive', p.is_active
                 )
                 FROM cultural_places p WHERE p.id = $1"
            }
            "events" => {
                "SELECT json_build_object(
                    '_id', e.id,
                    'name', e.name,
                    'description', e.description,
                    'date', e.date,
                    'time', e.time,
                    'image', e.image,
                    'status', e.status,
                    'isActive', e.is_active,
                    'culturalPlaceId', json_build_object(
                        '_id', p.id,
                        'name', p.name,
                        'description', p.description,
                        'category', p.category,
                        'characteristics', p.characteristics,
                        'contact', p.contact,
                        'image', p.image,
                        'rating', p.rating
                    )
                 )
                 FROM events e
                 JOIN cultural_places p ON p.id = e.cultural_place_id
                 WHERE e.id = $1"
            }
            "tickets" => {
                "SELECT json_build_object(
                    '_id', t.id,
                    'userEmail', t.user_email,
                    'userName', t.user_name,
                    'ticketType', t.ticket_type,
                    'status', t.status,
                    'eventId', json_build_object(
                        '_id', e.id,
                        'name', e.name,
                        'description', e.description,
                        'date', e.date,
                        'time', e.time,
                        'image', e.image,
                        'culturalPlaceId', json_build_object(
                            '_id', p.id,
                            'name', p.name,
                            'description', p.description,
                            'category', p.category,
                            'characteristics', p.characteristics,
                            'contact', p.contact,
                            'image', p.image,
                            'rating', p.rating
                        )
                    )
                 )
                 FROM tickets t
                 JOIN events e ON e.id = t.event_id
                 JOIN cultural_places p ON p.id = e.cultural_place_id
                 WHERE t.id = $1"
            }
            other => {
                debug!(collection = other, "No projection defined, skipping populate");
                return Ok(None);
            }
        };

        let row: Option<(Value,)> = sqlx::query_as(sql)
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(doc,)| doc))
    }
}
