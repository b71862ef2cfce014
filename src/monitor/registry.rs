//! Process-wide status registry shared by the service loops and the web API.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::models::{ServiceStatus, StatusEntry};

/// Thread-safe map from service name to its latest recorded status.
///
/// Each service loop writes only its own key, so one lock over the whole map
/// is enough; writers never hold it across an await point.
#[derive(Debug, Clone, Default)]
pub struct StatusRegistry {
    entries: Arc<RwLock<HashMap<String, StatusEntry>>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the entry for `name`, if a check has completed.
    pub fn get(&self, name: &str) -> Option<StatusEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(name).cloned()
    }

    /// Last recorded status, `Unknown` before the first completed check.
    pub fn status(&self, name: &str) -> ServiceStatus {
        self.get(name).map(|e| e.status).unwrap_or_default()
    }

    /// Record a check result and return the previous entry.
    pub fn record(
        &self,
        name: &str,
        status: ServiceStatus,
        down_since: Option<DateTime<Utc>>,
        checked_at: DateTime<Utc>,
    ) -> Option<StatusEntry> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            name.to_string(),
            StatusEntry {
                status,
                down_since,
                last_check: checked_at,
            },
        )
    }

    /// Copy of every entry.
    pub fn entries(&self) -> HashMap<String, StatusEntry> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
