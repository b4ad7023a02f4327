use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{CdcError, Result};
use crate::handlers::EventChangeType;
use crate::repositories::{TicketDirectory, TicketHolder};

/// What the notification-trigger handler forwards: the full event snapshot
/// plus the classified change.
#[derive(Debug, Clone)]
pub struct EventChangeNotification {
    pub event: Value,
    pub change_type: EventChangeType,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// External notification collaborator. The pipeline hands over the change and
/// the collaborator owns per-recipient delivery.
#[async_trait]
pub trait EventNotifier: Send + Sync {
    async fn notify_event_change(&self, notification: &EventChangeNotification) -> Result<()>;
}

/// One outgoing email, already addressed.
#[derive(Debug, Clone)]
pub struct EventEmail {
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &EventEmail) -> Result<()>;
}

/// SMTP sender used in production.
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

/// SMTP settings, read from the environment.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

impl SmtpConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(587),
            username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
            password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            from_email: std::env::var("FROM_EMAIL")
                .unwrap_or_else(|_| "noreply@citypass.dev".to_string()),
            from_name: std::env::var("FROM_NAME").unwrap_or_else(|_| "CityPass".to_string()),
        }
    }
}

impl SmtpEmailSender {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            transport,
            from: format!("{} <{}>", config.from_name, config.from_email),
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, email: &EventEmail) -> Result<()> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| CdcError::Notification(format!("Invalid sender: {e}")))?,
            )
            .to(format!("{} <{}>", email.to_name, email.to_email)
                .parse()
                .map_err(|e| CdcError::Notification(format!("Invalid recipient: {e}")))?)
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| CdcError::Notification(format!("Failed to build email: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| CdcError::Notification(format!("SMTP send failed: {e}")))?;
        Ok(())
    }
}

/// Fans an event change out to every active ticket holder.
///
/// A failed send for one recipient is logged and must not abort delivery to
/// the remaining recipients.
pub struct EventNotificationService {
    tickets: Arc<dyn TicketDirectory>,
    email: Arc<dyn EmailSender>,
}

impl EventNotificationService {
    pub fn new(tickets: Arc<dyn TicketDirectory>, email: Arc<dyn EmailSender>) -> Self {
        Self { tickets, email }
    }

    fn compose(
        notification: &EventChangeNotification,
        holder: &TicketHolder,
        event_name: &str,
    ) -> EventEmail {
        let new_value = notification
            .new_value
            .clone()
            .unwrap_or(Value::String("N/A".to_string()));

        let (subject, body) = match notification.change_type {
            EventChangeType::Cancellation => (
                format!("Evento cancelado: {event_name}"),
                format!(
                    "Hola {},\n\nEl evento \"{}\" ha sido cancelado por el organizador.\n\
                     Tus {} entrada(s) ({}) quedan sin efecto.\n",
                    holder.user_name,
                    event_name,
                    holder.ticket_count,
                    holder.ticket_types.join(", "),
                ),
            ),
            _ => (
                format!("Evento modificado: {event_name}"),
                format!(
                    "Hola {},\n\nEl evento \"{}\" fue modificado ({}).\nNuevo valor: {}.\n\
                     Tenés {} entrada(s) ({}).\n",
                    holder.user_name,
                    event_name,
                    notification.change_type.as_str(),
                    new_value,
                    holder.ticket_count,
                    holder.ticket_types.join(", "),
                ),
            ),
        };

        EventEmail {
            to_email: holder.user_email.clone(),
            to_name: holder.user_name.clone(),
            subject,
            body,
        }
    }
}

#[async_trait]
impl EventNotifier for EventNotificationService {
    async fn notify_event_change(&self, notification: &EventChangeNotification) -> Result<()> {
        let Some(event_id) = notification.event.get("_id").and_then(Value::as_str) else {
            warn!("Event change notification without event id, skipping");
            return Ok(());
        };
        let event_name = notification
            .event
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("N/A");

        let holders = self.tickets.active_ticket_holders(event_id).await?;
        if holders.is_empty() {
            info!(event_id, "No active ticket holders, nothing to notify");
            return Ok(());
        }

        info!(
            event_id,
            change_type = notification.change_type.as_str(),
            recipients = holders.len(),
            "Sending event change notifications"
        );

        for holder in &holders {
            let email = Self::compose(notification, holder, event_name);
            if let Err(e) = self.email.send(&email).await {
                error!(
                    event_id,
                    recipient = %holder.user_email,
                    "Failed to send notification email: {}",
                    e
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct StaticDirectory {
        holders: Vec<TicketHolder>,
    }

    #[async_trait]
    impl TicketDirectory for StaticDirectory {
        async fn active_ticket_holders(&self, _event_id: &str) -> Result<Vec<TicketHolder>> {
            Ok(self.holders.clone())
        }
    }

    #[derive(Default)]
    struct FlakySender {
        fail_for: Option<String>,
        sent: Mutex<Vec<EventEmail>>,
    }

    #[async_trait]
    impl EmailSender for FlakySender {
        async fn send(&self, email: &EventEmail) -> Result<()> {
            if self.fail_for.as_deref() == Some(email.to_email.as_str()) {
                return Err(CdcError::Notification("smtp down".to_string()));
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    fn holder(email: &str) -> TicketHolder {
        TicketHolder {
            user_email: email.to_string(),
            user_name: "Ana".to_string(),
            ticket_count: 2,
            ticket_types: vec!["general".to_string()],
        }
    }

    fn cancellation() -> EventChangeNotification {
        EventChangeNotification {
            event: json!({"_id": "e1", "name": "Feria del Libro"}),
            change_type: EventChangeType::Cancellation,
            old_value: None,
            new_value: Some(json!("INACTIVE")),
        }
    }

    #[tokio::test]
    async fn one_failed_recipient_does_not_abort_the_rest() {
        let sender = Arc::new(FlakySender {
            fail_for: Some("a@x.com".to_string()),
            sent: Mutex::new(Vec::new()),
        });
        let service = EventNotificationService::new(
            Arc::new(StaticDirectory {
                holders: vec![holder("a@x.com"), holder("b@x.com"), holder("c@x.com")],
            }),
            Arc::clone(&sender) as Arc<dyn EmailSender>,
        );

        service.notify_event_change(&cancellation()).await.unwrap();

        let sent = sender.sent.lock().unwrap();
        let recipients: Vec<_> = sent.iter().map(|e| e.to_email.as_str()).collect();
        assert_eq!(recipients, vec!["b@x.com", "c@x.com"]);
    }

    #[tokio::test]
    async fn no_holders_means_no_sends() {
        let sender = Arc::new(FlakySender::default());
        let service = EventNotificationService::new(
            Arc::new(StaticDirectory { holders: vec![] }),
            Arc::clone(&sender) as Arc<dyn EmailSender>,
        );

        service.notify_event_change(&cancellation()).await.unwrap();
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_email_mentions_the_event() {
        let sender = Arc::new(FlakySender::default());
        let service = EventNotificationService::new(
            Arc::new(StaticDirectory {
                holders: vec![holder("a@x.com")],
            }),
            Arc::clone(&sender) as Arc<dyn EmailSender>,
        );

        service.notify_event_change(&cancellation()).await.unwrap();

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].subject.contains("Feria del Libro"));
        assert!(sent[0].subject.to_lowercase().contains("cancelado"));
    }
}
