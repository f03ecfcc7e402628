//! Human-readable relative time formatting
//!
//! Used by carousel footers and archive replies ("About 5 minutes ago").

use chrono::{DateTime, Utc};

/// Relative time selection thresholds (seconds)
const MINUTE: i64 = 60;
const HOUR: i64 = 3600;
const DAY: i64 = 86400;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

/// Format an elapsed duration in seconds as a natural phrase
///
/// # Examples
///
/// ```
/// use sxm_common::human_time::natural_delta;
///
/// assert_eq!(natural_delta(0), "now");
/// assert_eq!(natural_delta(1), "a second");
/// assert_eq!(natural_delta(45), "45 seconds");
/// assert_eq!(natural_delta(90), "a minute");
/// assert_eq!(natural_delta(600), "10 minutes");
/// assert_eq!(natural_delta(7200), "2 hours");
/// assert_eq!(natural_delta(86400 * 3), "3 days");
/// ```
pub fn natural_delta(seconds: i64) -> String {
    // Negative values (clock skew) are treated as zero
    let seconds = seconds.max(0);

    match seconds {
        0 => "now".to_string(),
        1 => "a second".to_string(),
        s if s < MINUTE => format!("{} seconds", s),
        s if s < 2 * MINUTE => "a minute".to_string(),
        s if s < HOUR => format!("{} minutes", s / MINUTE),
        s if s < 2 * HOUR => "an hour".to_string(),
        s if s < DAY => format!("{} hours", s / HOUR),
        s if s < 2 * DAY => "a day".to_string(),
        s if s < MONTH => format!("{} days", s / DAY),
        s if s < 2 * MONTH => "a month".to_string(),
        s if s < YEAR => format!("{} months", s / MONTH),
        s if s < 2 * YEAR => "a year".to_string(),
        s => format!("{} years", s / YEAR),
    }
}

/// Format the time elapsed from `then` to `now` as "<delta> ago"
///
/// Returns "now" when the two instants are equal (or `then` is in the future).
pub fn time_ago(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let delta = natural_delta((now - then).num_seconds());
    if delta == "now" {
        delta
    } else {
        format!("{} ago", delta)
    }
}
