use std::sync::Arc;

use async_trait::async_trait;
use message_dispatch::Handler;
use tracing::{info, warn};

use crate::handlers::place_status_matches;
use crate::models::ChangeEvent;
use crate::repositories::{CascadeGuard, CascadeUpdate, EventCatalog};

const ACTIVE: &str = "ACTIVE";

/// Inverse of the closure cascade: a place restored to ACTIVE reactivates its
/// events, with the symmetric guard (`status <> ACTIVE OR NOT is_active`).
pub struct PlaceActivationHandler {
    events: Arc<dyn EventCatalog>,
}

impl PlaceActivationHandler {
    pub fn new(events: Arc<dyn EventCatalog>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl Handler<ChangeEvent> for PlaceActivationHandler {
    fn name(&self) -> &'static str {
        "place-activation"
    }

    fn can_handle(&self, message: &ChangeEvent) -> bool {
        place_status_matches(message, ACTIVE)
    }

    async fn handle(&self, message: &ChangeEvent) -> anyhow::Result<()> {
        let Some(place_id) = message.subject_id() else {
            warn!("Activation message without cultural place id, skipping");
            return Ok(());
        };

        info!(place_id, "Cultural place restored to ACTIVE, reactivating events");

        let modified = self
            .events
            .update_events_by_place(
                &place_id,
                &CascadeUpdate::new(ACTIVE, true),
                &CascadeGuard::NotAlreadyApplied,
            )
            .await?;

        info!(place_id, modified, "Events reactivated");
        Ok(())
    }
}
