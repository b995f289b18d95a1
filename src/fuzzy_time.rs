//! Human-friendly "how long ago" strings for notification text.

use chrono::{DateTime, Duration, Utc};

const DAY: i64 = 24 * 60 * 60;
const WEEK: i64 = 7 * DAY;
const YEAR: i64 = 365 * DAY + 6 * 60 * 60;
const MONTH: i64 = YEAR / 12;

/// Describe how long before `now` the instant `then` was.
pub fn fuzzy_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let since = now - then;
    if since < Duration::zero() {
        return "some time in the future".to_string();
    }
    let secs = since.num_seconds();
    if secs < 5 {
        "moments ago".to_string()
    } else if secs < 90 {
        plural(secs, "a second")
    } else if secs < 90 * 60 {
        plural(secs / 60, "a minute")
    } else if secs < DAY {
        plural(secs / 3600, "an hour")
    } else if secs < WEEK {
        plural(secs / DAY, "a day")
    } else if secs < MONTH {
        plural(secs / WEEK, "a week")
    } else if secs < YEAR {
        plural(secs / MONTH, "a month")
    } else {
        plural(secs / YEAR, "a year")
    }
}

/// `unit` is the singular phrase with its article, e.g. "an hour".
fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        return format!("{} ago", unit);
    }
    let noun = unit.split_once(' ').map(|(_, n)| n).unwrap_or(unit);
    format!("{} {}s ago", count, noun)
}

/// Upper-case the first letter of the first word.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
