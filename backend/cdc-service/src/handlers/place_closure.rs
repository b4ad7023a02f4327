use std::sync::Arc;

use async_trait::async_trait;
use message_dispatch::Handler;
use tracing::{info, warn};

use crate::handlers::place_status_matches;
use crate::models::ChangeEvent;
use crate::repositories::{CascadeGuard, CascadeUpdate, EventCatalog};

const CLOSED_DOWN: &str = "CLOSED_DOWN";
const PAUSED_BY_CLOSURE: &str = "PAUSED_BY_CLOSURE";

/// Permanent closure of a cultural place pauses every related event.
///
/// The guard filter excludes events already paused by closure, so a duplicate
/// delivery of the same message modifies zero further rows.
pub struct PlaceClosureHandler {
    events: Arc<dyn EventCatalog>,
}

impl PlaceClosureHandler {
    pub fn new(events: Arc<dyn EventCatalog>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl Handler<ChangeEvent> for PlaceClosureHandler {
    fn name(&self) -> &'static str {
        "place-closure"
    }

    fn can_handle(&self, message: &ChangeEvent) -> bool {
        place_status_matches(message, CLOSED_DOWN)
    }

    async fn handle(&self, message: &ChangeEvent) -> anyhow::Result<()> {
        let Some(place_id) = message.subject_id() else {
            warn!("Closed-down message without cultural place id, skipping");
            return Ok(());
        };

        info!(place_id, "Cultural place closed down, pausing related events");

        let modified = self
            .events
            .update_events_by_place(
                &place_id,
                &CascadeUpdate::new(PAUSED_BY_CLOSURE, false),
                &CascadeGuard::NotAlreadyApplied,
            )
            .await?;

        info!(place_id, modified, "Events paused by closure");
        Ok(())
    }
}
