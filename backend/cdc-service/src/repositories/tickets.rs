use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{CdcError, Result};

/// One recipient of an event-change notification.
#[derive(Debug, Clone)]
pub struct TicketHolder {
    pub user_email: String,
    pub user_name: String,
    pub ticket_count: i64,
    pub ticket_types: Vec<String>,
}

/// Lookup of who holds active tickets for an event. The pipeline does not
/// know recipient identities beyond what this returns.
#[async_trait]
pub trait TicketDirectory: Send + Sync {
    async fn active_ticket_holders(&self, event_id: &str) -> Result<Vec<TicketHolder>>;
}

pub struct PgTicketDirectory {
    pool: PgPool,
}

impl PgTicketDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TicketDirectory for PgTicketDirectory {
    async fn active_ticket_holders(&self, event_id: &str) -> Result<Vec<TicketHolder>> {
        let event: Uuid = event_id
            .parse()
            .map_err(|_| CdcError::Validation(format!("Invalid event id '{event_id}'")))?;

        let rows: Vec<(String, String, i64, Vec<String>)> = sqlx::query_as(
            "SELECT user_email, user_name, count(*) AS ticket_count, \
                    array_agg(DISTINCT ticket_type) AS ticket_types \
             FROM tickets \
             WHERE event_id = $1 AND status = 'ACTIVE' \
             GROUP BY user_email, user_name",
        )
        .bind(event)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(user_email, user_name, ticket_count, ticket_types)| TicketHolder {
                    user_email,
                    user_name,
                    ticket_count,
                    ticket_types,
                },
            )
            .collect())
    }
}
