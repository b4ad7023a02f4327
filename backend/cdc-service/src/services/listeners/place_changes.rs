use std::sync::Arc;

use message_dispatch::HandlerSet;

use crate::error::Result;
use crate::handlers::{
    ClosureWindowPolicy, PlaceActivationHandler, PlaceClosureHandler, PlaceTemporalClosureHandler,
};
use crate::models::ChangeEvent;
use crate::repositories::EventCatalog;
use crate::services::broker::{create_consumer, BrokerConfig};
use crate::services::listeners::TopicListener;

/// Queue (consumer group) and topic for cultural-place change messages.
pub const PLACE_CHANGES_QUEUE: &str = "cultura.culturalplaces.modificar";

/// Listener for cultural-place changes.
///
/// Handler order is load-bearing: closure, temporal closure, activation.
pub fn place_change_listener(
    config: &BrokerConfig,
    events: Arc<dyn EventCatalog>,
    policy: ClosureWindowPolicy,
) -> Result<TopicListener<ChangeEvent>> {
    let handlers = HandlerSet::new()
        .register(PlaceClosureHandler::new(Arc::clone(&events)))
        .register(PlaceTemporalClosureHandler::new(
            Arc::clone(&events),
            policy,
        ))
        .register(PlaceActivationHandler::new(events));

    let consumer = create_consumer(config, PLACE_CHANGES_QUEUE, &[PLACE_CHANGES_QUEUE])?;
    Ok(TopicListener::new(
        "cultural-place-changes",
        consumer,
        handlers,
    ))
}
