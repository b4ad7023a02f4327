use std::sync::Arc;

use async_trait::async_trait;
use message_dispatch::Handler;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::handlers::EVENTS_COLLECTION;
use crate::models::{ChangeEvent, ChangeOperation};
use crate::services::notifications::{EventChangeNotification, EventNotifier};

/// Classification of an event update into the notification-worthy kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventChangeType {
    DateChange,
    TimeChange,
    DateTimeChange,
    Activation,
    Cancellation,
}

impl EventChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventChangeType::DateChange => "date_change",
            EventChangeType::TimeChange => "time_change",
            EventChangeType::DateTimeChange => "date_time_change",
            EventChangeType::Activation => "activation",
            EventChangeType::Cancellation => "cancellation",
        }
    }
}

/// Detects critical changes on event updates and forwards them to the
/// notification collaborator. A non-critical change is a no-op, not an error.
pub struct EventNotificationHandler {
    notifier: Arc<dyn EventNotifier>,
}

impl EventNotificationHandler {
    pub fn new(notifier: Arc<dyn EventNotifier>) -> Self {
        Self { notifier }
    }

    fn resolve_change_type(
        current: &Value,
        updated_fields: &Map<String, Value>,
    ) -> Option<EventChangeType> {
        let date_changed = updated_fields.contains_key("date");
        let time_changed = updated_fields.contains_key("time");

        if date_changed && time_changed {
            return Some(EventChangeType::DateTimeChange);
        }
        if date_changed {
            return Some(EventChangeType::DateChange);
        }
        if time_changed {
            return Some(EventChangeType::TimeChange);
        }

        if updated_fields.contains_key("isActive") {
            if let Some(is_active) = current.get("isActive").and_then(Value::as_bool) {
                return Some(if is_active {
                    EventChangeType::Activation
                } else {
                    EventChangeType::Cancellation
                });
            }
        }

        None
    }

    fn build_new_value(change_type: EventChangeType, current: &Value) -> Value {
        let field = |name: &str| current.get(name).cloned().unwrap_or(json!("N/A"));
        match change_type {
            EventChangeType::DateChange => field("date"),
            EventChangeType::TimeChange => field("time"),
            EventChangeType::DateTimeChange => json!({
                "date": field("date"),
                "time": field("time"),
            }),
            EventChangeType::Activation => json!("ACTIVE"),
            EventChangeType::Cancellation => json!("INACTIVE"),
        }
    }
}

#[async_trait]
impl Handler<ChangeEvent> for EventNotificationHandler {
    fn name(&self) -> &'static str {
        "event-notification"
    }

    fn can_handle(&self, message: &ChangeEvent) -> bool {
        message.collection == EVENTS_COLLECTION && message.event_type == ChangeOperation::Update
    }

    async fn handle(&self, message: &ChangeEvent) -> anyhow::Result<()> {
        let Some(current) = message.data.as_ref() else {
            warn!("Event change message without current data, skipping");
            return Ok(());
        };

        let empty = Map::new();
        let updated_fields = message.updated_fields.as_ref().unwrap_or(&empty);

        let Some(change_type) = Self::resolve_change_type(current, updated_fields) else {
            debug!(
                document_id = %message.document_id,
                "Event change without critical type, acking as no-op"
            );
            return Ok(());
        };

        let new_value = Self::build_new_value(change_type, current);

        self.notifier
            .notify_event_change(&EventChangeNotification {
                event: current.clone(),
                change_type,
                old_value: None,
                new_value: Some(new_value),
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        notifications: Mutex<Vec<EventChangeNotification>>,
    }

    impl RecordingNotifier {
        fn taken(&self) -> Vec<EventChangeNotification> {
            self.notifications.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventNotifier for RecordingNotifier {
        async fn notify_event_change(
            &self,
            notification: &EventChangeNotification,
        ) -> crate::error::Result<()> {
            self.notifications.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    fn event_message(updated: Value, data: Value) -> ChangeEvent {
        ChangeEvent::new(
            "events",
            ChangeOperation::Update,
            "e1",
            Some(data),
            updated.as_object().cloned(),
        )
    }

    fn handler() -> (EventNotificationHandler, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        (
            EventNotificationHandler::new(Arc::clone(&notifier) as Arc<dyn EventNotifier>),
            notifier,
        )
    }

    #[test]
    fn matches_updates_on_event_collection_only() {
        let (handler, _) = handler();

        assert!(handler.can_handle(&event_message(json!({}), json!({}))));

        let mut insert = event_message(json!({}), json!({}));
        insert.event_type = ChangeOperation::Insert;
        assert!(!handler.can_handle(&insert));

        let mut other = event_message(json!({}), json!({}));
        other.collection = "culturalplaces".to_string();
        assert!(!handler.can_handle(&other));
    }

    #[tokio::test]
    async fn classifies_date_and_time_changes() {
        let (handler, notifier) = handler();

        handler
            .handle(&event_message(
                json!({"date": "2025-02-01"}),
                json!({"_id": "e1", "date": "2025-02-01", "time": "20:00"}),
            ))
            .await
            .unwrap();
        handler
            .handle(&event_message(
                json!({"time": "21:00"}),
                json!({"_id": "e1", "date": "2025-02-01", "time": "21:00"}),
            ))
            .await
            .unwrap();
        handler
            .handle(&event_message(
                json!({"date": "2025-02-02", "time": "22:00"}),
                json!({"_id": "e1", "date": "2025-02-02", "time": "22:00"}),
            ))
            .await
            .unwrap();

        let sent = notifier.taken();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].change_type, EventChangeType::DateChange);
        assert_eq!(sent[0].new_value, Some(json!("2025-02-01")));
        assert_eq!(sent[1].change_type, EventChangeType::TimeChange);
        assert_eq!(
            sent[2].change_type,
            EventChangeType::DateTimeChange
        );
        assert_eq!(
            sent[2].new_value,
            Some(json!({"date": "2025-02-02", "time": "22:00"}))
        );
    }

    #[tokio::test]
    async fn classifies_activation_and_cancellation() {
        let (handler, notifier) = handler();

        handler
            .handle(&event_message(
                json!({"isActive": true}),
                json!({"_id": "e1", "isActive": true}),
            ))
            .await
            .unwrap();
        handler
            .handle(&event_message(
                json!({"isActive": false}),
                json!({"_id": "e1", "isActive": false}),
            ))
            .await
            .unwrap();

        let sent = notifier.taken();
        assert_eq!(sent[0].change_type, EventChangeType::Activation);
        assert_eq!(sent[0].new_value, Some(json!("ACTIVE")));
        assert_eq!(sent[1].change_type, EventChangeType::Cancellation);
        assert_eq!(sent[1].new_value, Some(json!("INACTIVE")));
    }

    #[tokio::test]
    async fn non_critical_change_is_a_no_op() {
        let (handler, notifier) = handler();

        handler
            .handle(&event_message(
                json!({"description": "new text"}),
                json!({"_id": "e1", "description": "new text"}),
            ))
            .await
            .unwrap();

        assert!(notifier.taken().is_empty());
    }

    #[tokio::test]
    async fn message_without_data_is_skipped() {
        let (handler, notifier) = handler();

        let mut message = event_message(json!({"date": "2025-02-01"}), json!({}));
        message.data = None;

        handler.handle(&message).await.unwrap();
        assert!(notifier.taken().is_empty());
    }
}
