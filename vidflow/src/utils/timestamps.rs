//! Timestamp helpers.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp as `YYYY-MM-DDTHH:MM:SS.ffffff+00:00`.
#[must_use]
pub fn iso_timestamp(ts: &Timestamp) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Returns true if `ts` lies more than `age` in the past.
///
/// Timestamps in the future are never considered older than anything.
#[must_use]
pub fn is_older_than(ts: &Timestamp, age: Duration) -> bool {
    let Ok(age) = chrono::Duration::from_std(age) else {
        return false;
    };
    now_utc().signed_duration_since(*ts) > age
}
