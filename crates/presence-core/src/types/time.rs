//! Wall-clock timestamps as carried on the wire.

use chrono::{DateTime, Utc};

/// Milliseconds since the Unix epoch.
pub type EpochMillis = i64;

/// Convert epoch milliseconds to a UTC datetime, if representable.
pub fn to_datetime(millis: EpochMillis) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Saturating `millis + duration` for expiry arithmetic.
pub fn add_duration(millis: EpochMillis, duration: std::time::Duration) -> EpochMillis {
    let delta = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
    millis.saturating_add(delta)
}
