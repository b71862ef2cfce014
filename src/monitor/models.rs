//! Monitor data model types.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::maintenance::{in_maintenance, resolve_timezone};

/// What to probe and how. One variant per check kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CheckKind {
    Http { url: String },
    Port { host: String, port: u16 },
    Ping { host: String },
}

impl CheckKind {
    /// Short lowercase name, as written in the config file.
    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::Http { .. } => "http",
            CheckKind::Port { .. } => "port",
            CheckKind::Ping { .. } => "ping",
        }
    }

    /// Reason reported when a probe of this kind fails normally.
    pub fn failure_reason(&self) -> String {
        match self {
            CheckKind::Http { .. } => "HTTP status not 200".to_string(),
            CheckKind::Port { port, .. } => format!("Could not connect to port {}", port),
            CheckKind::Ping { .. } => "No ping response".to_string(),
        }
    }
}

/// A recurring daily local-time window during which checks are suspended.
///
/// If `end` is earlier than `start` the window crosses midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl MaintenanceWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse a window from two `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, chrono::ParseError> {
        Ok(Self {
            start: NaiveTime::parse_from_str(start, "%H:%M")?,
            end: NaiveTime::parse_from_str(end, "%H:%M")?,
        })
    }
}

/// A monitored service. Immutable after load.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDefinition {
    pub name: String,
    pub check: CheckKind,
    pub timeout: Duration,
    pub max_tries: u32,
    pub interval: Duration,
    pub maintenance_window: Option<MaintenanceWindow>,
    /// Timezone override; the process timezone applies when absent.
    pub timezone: Option<String>,
}

/// A service definition together with its resolved timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredService {
    pub definition: ServiceDefinition,
    pub timezone: Tz,
}

impl MonitoredService {
    /// Resolve the service's timezone override against the process timezone.
    pub fn new(definition: ServiceDefinition, process_tz: Tz) -> Self {
        let timezone = match &definition.timezone {
            Some(name) => resolve_timezone(name, process_tz),
            None => process_tz,
        };
        Self { definition, timezone }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Whether `now` falls inside this service's maintenance window.
    pub fn in_maintenance(&self, now: DateTime<Utc>) -> bool {
        self.definition
            .maintenance_window
            .as_ref()
            .is_some_and(|window| in_maintenance(now, window, self.timezone))
    }
}

/// Recorded status of a service.
///
/// The service loop only ever writes `Up` or `Down`. `Maintenance` is
/// computed when a snapshot is taken and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceStatus {
    #[default]
    Unknown,
    Up,
    Down,
    Maintenance,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceStatus::Unknown => "UNKNOWN",
            ServiceStatus::Up => "UP",
            ServiceStatus::Down => "DOWN",
            ServiceStatus::Maintenance => "MAINTENANCE",
        };
        f.write_str(s)
    }
}

/// Registry entry for one service.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEntry {
    pub status: ServiceStatus,
    /// Set on the transition into `Down`, cleared on recovery.
    pub down_since: Option<DateTime<Utc>>,
    pub last_check: DateTime<Utc>,
}
