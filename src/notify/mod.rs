//! Status-change notifications.

mod email;

pub use email::*;

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use std::fmt;
use thiserror::Error;

/// Notification error types.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("invalid address: {0}")]
    Address(String),
    #[error("failed to build message: {0}")]
    Message(String),
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("delivery task failed: {0}")]
    Task(String),
}

/// Direction of a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Up,
    Down,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Up => f.write_str("UP"),
            Transition::Down => f.write_str("DOWN"),
        }
    }
}

/// A single status-change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub service: String,
    pub transition: Transition,
    /// Reason of the last failed attempt, for DOWN notifications.
    pub reason: Option<String>,
    /// Formatted total downtime, for UP notifications.
    pub downtime: Option<String>,
    pub timestamp: DateTime<Tz>,
}

impl Notification {
    pub fn subject(&self) -> String {
        let marker = match self.transition {
            Transition::Down => "🔴",
            Transition::Up => "✅",
        };
        format!("{} Service Monitor Alert - {} is {}", marker, self.service, self.transition)
    }

    pub fn body(&self) -> String {
        let mut lines = vec![
            format!("Service: {}", self.service),
            format!("Status: {}", self.transition),
            format!("Timestamp: {}", self.timestamp.format("%Y-%m-%d %H:%M:%S %Z")),
        ];
        if let Some(downtime) = &self.downtime {
            lines.push(format!("Total downtime: {}", downtime));
        }
        if let Some(reason) = &self.reason {
            lines.push(format!("Reason: {}", reason));
        }
        lines.join("\n")
    }
}

/// Delivers notifications to operators.
///
/// Implementations that cannot deliver because they are not configured
/// should log a warning and return `Ok(())`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn notification(transition: Transition) -> Notification {
        Notification {
            service: "api".to_string(),
            transition,
            reason: None,
            downtime: None,
            timestamp: Tz::UTC.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_down_message() {
        let mut n = notification(Transition::Down);
        n.reason = Some("Connection timeout".to_string());

        assert_eq!(n.subject(), "🔴 Service Monitor Alert - api is DOWN");
        assert_eq!(
            n.body(),
            "Service: api\nStatus: DOWN\nTimestamp: 2024-01-15 12:00:00 UTC\nReason: Connection timeout"
        );
    }

    #[test]
    fn test_up_message_includes_downtime() {
        let mut n = notification(Transition::Up);
        n.downtime = Some("1 hours".to_string());

        assert_eq!(n.subject(), "✅ Service Monitor Alert - api is UP");
        assert!(n.body().contains("Status: UP"));
        assert!(n.body().ends_with("Total downtime: 1 hours"));
    }
}
