use std::sync::Arc;

use message_dispatch::HandlerSet;

use crate::error::Result;
use crate::handlers::EventNotificationHandler;
use crate::models::ChangeEvent;
use crate::services::broker::{create_consumer, BrokerConfig};
use crate::services::listeners::TopicListener;
use crate::services::notifications::EventNotifier;

/// Queue (consumer group) and topic for event change messages.
pub const EVENT_CHANGES_QUEUE: &str = "cultura.events.modificar";

/// Listener for event changes; currently only the notification trigger is
/// registered.
pub fn event_change_listener(
    config: &BrokerConfig,
    notifier: Arc<dyn EventNotifier>,
) -> Result<TopicListener<ChangeEvent>> {
    let handlers = HandlerSet::new().register(EventNotificationHandler::new(notifier));

    let consumer = create_consumer(config, EVENT_CHANGES_QUEUE, &[EVENT_CHANGES_QUEUE])?;
    Ok(TopicListener::new("event-changes", consumer, handlers))
}
