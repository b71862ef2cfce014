//! Maintenance window evaluation and timezone resolution.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::models::MaintenanceWindow;

/// Timezone used when the configured process timezone is missing or invalid.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Berlin;

/// Resolve an IANA timezone name, falling back to `fallback` with a warning.
pub fn resolve_timezone(name: &str, fallback: Tz) -> Tz {
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!("Unknown timezone: {}, falling back to {}", name, fallback.name());
            fallback
        }
    }
}

/// Check whether `now` falls inside the daily `window` as observed in `tz`.
///
/// Both ends are inclusive and compared as local wall-clock times, so DST
/// transitions never move the window. A window whose end lies before its
/// start extends past midnight.
pub fn in_maintenance(now: DateTime<Utc>, window: &MaintenanceWindow, tz: Tz) -> bool {
    let now_time = now.with_timezone(&tz).time();

    if window.end < window.start {
        now_time >= window.start || now_time <= window.end
    } else {
        window.start <= now_time && now_time <= window.end
    }
}
