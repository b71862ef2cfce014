//! Read-only status snapshot for dashboards.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::models::{CheckKind, MonitoredService, ServiceStatus};
use super::registry::StatusRegistry;

/// Display view of one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSnapshot {
    pub status: ServiceStatus,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down_since: Option<String>,
}

/// Build the snapshot of every service at `now`.
///
/// A service inside its maintenance window reports `MAINTENANCE` regardless
/// of its recorded status.
pub fn snapshot(
    services: &[Arc<MonitoredService>],
    registry: &StatusRegistry,
    tz: Tz,
    now: DateTime<Utc>,
) -> BTreeMap<String, ServiceSnapshot> {
    services
        .iter()
        .map(|service| (service.name().to_string(), service_snapshot(service, registry, tz, now)))
        .collect()
}

/// Snapshot of a single service.
pub fn service_snapshot(
    service: &MonitoredService,
    registry: &StatusRegistry,
    tz: Tz,
    now: DateTime<Utc>,
) -> ServiceSnapshot {
    let entry = registry.get(service.name());
    let status = if service.in_maintenance(now) {
        ServiceStatus::Maintenance
    } else {
        entry.as_ref().map(|e| e.status).unwrap_or_default()
    };

    let (host, url, port) = match &service.definition.check {
        CheckKind::Http { url } => (None, Some(url.clone()), None),
        CheckKind::Port { host, port } => (Some(host.clone()), None, Some(*port)),
        CheckKind::Ping { host } => (Some(host.clone()), None, None),
    };

    let down_since = match &entry {
        Some(e) if status == ServiceStatus::Down => e
            .down_since
            .map(|t| t.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string()),
        _ => None,
    };

    ServiceSnapshot {
        status,
        kind: service.definition.check.name(),
        last_check: entry.map(|e| e.last_check.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string()),
        host,
        url,
        port,
        down_since,
    }
}
