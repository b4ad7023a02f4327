pub mod event_notification;
pub mod place_activation;
pub mod place_closure;
pub mod place_temporal_closure;

pub use event_notification::{EventChangeType, EventNotificationHandler};
pub use place_activation::PlaceActivationHandler;
pub use place_closure::PlaceClosureHandler;
pub use place_temporal_closure::{ClosureWindowPolicy, PlaceTemporalClosureHandler};

use crate::models::ChangeEvent;

pub(crate) const CULTURAL_PLACES_COLLECTION: &str = "culturalplaces";
pub(crate) const EVENTS_COLLECTION: &str = "events";

/// Shared trigger shape of the cultural-place handlers: the changed
/// collection is the place collection and the (possibly partial) status
/// equals the given sentinel.
pub(crate) fn place_status_matches(message: &ChangeEvent, sentinel: &str) -> bool {
    if message.collection != CULTURAL_PLACES_COLLECTION {
        return false;
    }
    message
        .status()
        .map(|s| s.to_uppercase() == sentinel)
        .unwrap_or(false)
}
