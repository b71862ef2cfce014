//! SMTP email notifier.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;

use super::{Notification, Notifier, NotifyError};
use crate::config::EmailConfig;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Complete SMTP settings.
#[derive(Debug, Clone)]
struct SmtpSettings {
    server: String,
    port: u16,
    username: String,
    password: String,
    recipient: String,
}

/// Sends notifications by email over STARTTLS.
#[derive(Debug, Clone)]
pub struct EmailNotifier {
    settings: Option<SmtpSettings>,
}

impl EmailNotifier {
    /// Build a notifier. An incomplete email block yields a notifier that
    /// skips every delivery with a warning.
    pub fn new(config: &EmailConfig) -> Self {
        let settings = match config {
            EmailConfig {
                smtp_server: Some(server),
                smtp_port: Some(port),
                username: Some(username),
                password: Some(password),
                notification_email: Some(recipient),
            } if !server.is_empty() && !username.is_empty() && !recipient.is_empty() => Some(SmtpSettings {
                server: server.clone(),
                port: *port,
                username: username.clone(),
                password: password.clone(),
                recipient: recipient.clone(),
            }),
            _ => None,
        };
        Self { settings }
    }

    pub fn is_configured(&self) -> bool {
        self.settings.is_some()
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let Some(settings) = self.settings.clone() else {
            tracing::warn!("Email configuration incomplete. Skipping notification.");
            return Ok(());
        };

        let message = build_message(&settings, &notification)?;

        // lettre's SMTP transport blocks; keep it off the runtime threads
        tokio::task::spawn_blocking(move || send_message(&settings, &message))
            .await
            .map_err(|e| NotifyError::Task(e.to_string()))??;

        tracing::info!(
            "Email notification sent for service {} - Status: {}",
            notification.service,
            notification.transition
        );
        Ok(())
    }
}

fn build_message(settings: &SmtpSettings, notification: &Notification) -> Result<Message, NotifyError> {
    let from: Mailbox = settings
        .username
        .parse()
        .map_err(|e| NotifyError::Address(format!("{}: {}", settings.username, e)))?;
    let to: Mailbox = settings
        .recipient
        .parse()
        .map_err(|e| NotifyError::Address(format!("{}: {}", settings.recipient, e)))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(notification.subject())
        .header(ContentType::TEXT_PLAIN)
        .body(notification.body())
        .map_err(|e| NotifyError::Message(e.to_string()))
}

fn send_message(settings: &SmtpSettings, message: &Message) -> Result<(), NotifyError> {
    let mailer = SmtpTransport::starttls_relay(&settings.server)
        .map_err(|e| NotifyError::Smtp(e.to_string()))?
        .port(settings.port)
        .credentials(Credentials::new(settings.username.clone(), settings.password.clone()))
        .timeout(Some(SMTP_TIMEOUT))
        .build();

    mailer.send(message).map_err(|e| NotifyError::Smtp(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Transition;
    use chrono::TimeZone;
    use chrono_tz::Tz;

    fn full_config() -> EmailConfig {
        EmailConfig {
            smtp_server: Some("smtp.test.com".to_string()),
            smtp_port: Some(587),
            username: Some("test@test.com".to_string()),
            password: Some("testpass".to_string()),
            notification_email: Some("notify@test.com".to_string()),
        }
    }

    fn notification() -> Notification {
        Notification {
            service: "test-service".to_string(),
            transition: Transition::Down,
            reason: Some("Connection timeout".to_string()),
            downtime: None,
            timestamp: Tz::UTC.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_complete_config_is_configured() {
        assert!(EmailNotifier::new(&full_config()).is_configured());
    }

    #[test]
    fn test_incomplete_config_is_not_configured() {
        let mut config = full_config();
        config.smtp_server = None;
        assert!(!EmailNotifier::new(&config).is_configured());
        assert!(!EmailNotifier::new(&EmailConfig::default()).is_configured());
    }

    #[tokio::test]
    async fn test_unconfigured_notifier_skips() {
        let notifier = EmailNotifier::new(&EmailConfig::default());
        tokio_test::assert_ok!(notifier.notify(notification()).await);
    }

    #[test]
    fn test_build_message() {
        let notifier = EmailNotifier::new(&full_config());
        let settings = notifier.settings.unwrap();
        let message = build_message(&settings, &notification()).unwrap();

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: notify@test.com"));
        assert!(raw.contains("Connection timeout"));
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let mut config = full_config();
        config.notification_email = Some("not an address".to_string());
        let settings = EmailNotifier::new(&config).settings.unwrap();

        assert!(matches!(
            build_message(&settings, &notification()),
            Err(NotifyError::Address(_))
        ));
    }
}
