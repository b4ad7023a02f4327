use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};
use message_dispatch::Handler;
use tracing::{info, warn};

use crate::handlers::place_status_matches;
use crate::models::ChangeEvent;
use crate::repositories::{CascadeGuard, CascadeUpdate, EventCatalog};

const TEMPORAL_CLOSED_DOWN: &str = "TEMPORAL_CLOSED_DOWN";
const TEMPORAL_PAUSED: &str = "TEMPORAL_PAUSED";

/// Hardcoded UTC compensation for the deployment timezone (UTC-4). The store
/// keeps event dates as local wall-clock timestamps.
const LOCAL_UTC_OFFSET_HOURS: i64 = 4;

/// How far around "today" a temporary closure reaches.
///
/// Two variants were observed in production: same-day only, and two days
/// before through two days after (a 5-day span). The wide window is the
/// canonical default; the policy stays configurable until product settles
/// the discrepancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureWindowPolicy {
    SameDay,
    Wide,
}

impl ClosureWindowPolicy {
    fn spread_days(self) -> i64 {
        match self {
            ClosureWindowPolicy::SameDay => 0,
            ClosureWindowPolicy::Wide => 2,
        }
    }
}

/// Local-time window [start-of-day, end-of-day] anchored on `now` minus the
/// fixed UTC compensation, widened by the policy's spread.
pub fn pause_window(
    now: DateTime<Utc>,
    policy: ClosureWindowPolicy,
) -> (NaiveDateTime, NaiveDateTime) {
    let local = (now - Duration::hours(LOCAL_UTC_OFFSET_HOURS)).naive_utc();
    let spread = Duration::days(policy.spread_days());

    let end_of_day =
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999).expect("valid end-of-day time");

    let start = (local - spread).date().and_time(NaiveTime::MIN);
    let end = (local + spread).date().and_time(end_of_day);
    (start, end)
}

/// Temporary closure pauses only the events scheduled inside the window.
///
/// The guard keeps `is_active = true` as the filter, so already-paused events
/// are excluded and a duplicate delivery converges to the same state.
pub struct PlaceTemporalClosureHandler {
    events: Arc<dyn EventCatalog>,
    policy: ClosureWindowPolicy,
}

impl PlaceTemporalClosureHandler {
    pub fn new(events: Arc<dyn EventCatalog>, policy: ClosureWindowPolicy) -> Self {
        Self { events, policy }
    }
}

#[async_trait]
impl Handler<ChangeEvent> for PlaceTemporalClosureHandler {
    fn name(&self) -> &'static str {
        "place-temporal-closure"
    }

    fn can_handle(&self, message: &ChangeEvent) -> bool {
        place_status_matches(message, TEMPORAL_CLOSED_DOWN)
    }

    async fn handle(&self, message: &ChangeEvent) -> anyhow::Result<()> {
        let Some(place_id) = message.subject_id() else {
            warn!("Temporary closure message without cultural place id, skipping");
            return Ok(());
        };

        let (start, end) = pause_window(Utc::now(), self.policy);

        info!(
            place_id,
            %start,
            %end,
            "Cultural place temporarily closed, pausing events inside window"
        );

        let modified = self
            .events
            .update_events_by_place(
                &place_id,
                &CascadeUpdate::new(TEMPORAL_PAUSED, false),
                &CascadeGuard::ActiveInWindow { start, end },
            )
            .await?;

        info!(place_id, modified, "Events temporarily paused");
        Ok(())
    }
}
