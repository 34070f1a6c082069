//! General time utility functions

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::time::Duration;

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// Convert a number of seconds from a parameter file into a `Duration`.
///
/// Negative and non-finite values give a zero duration.
pub fn secs(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    } else {
        Duration::ZERO
    }
}

/// First and last representable instants of a UTC day.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::default());
    let end = date.and_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(start);

    (Utc.from_utc_datetime(&start), Utc.from_utc_datetime(&end))
}
