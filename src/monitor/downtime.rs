//! Human-readable downtime durations.

use chrono::TimeDelta;

/// Format whole seconds as e.g. `"1 hours, 1 minutes, 1 seconds"`.
///
/// Zero units are skipped; seconds are always kept when nothing else is.
pub fn format_duration(total_seconds: u64) -> String {
    let (minutes, seconds) = (total_seconds / 60, total_seconds % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    let (days, hours) = (hours / 24, hours % 24);

    let mut parts = Vec::with_capacity(4);
    if days > 0 {
        parts.push(format!("{} days", days));
    }
    if hours > 0 {
        parts.push(format!("{} hours", hours));
    }
    if minutes > 0 {
        parts.push(format!("{} minutes", minutes));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{} seconds", seconds));
    }

    parts.join(", ")
}

/// Format an elapsed interval; negative intervals (clock skew) read as zero.
pub fn format_elapsed(elapsed: TimeDelta) -> String {
    format_duration(elapsed.num_seconds().max(0) as u64)
}
