use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};

use shared_models::lookup::TimeGroupWindow;

pub fn seconds_since_midnight(at: DateTime<Utc>) -> i64 {
    at.time().num_seconds_from_midnight() as i64
}

pub fn time_seconds(time: NaiveTime) -> i64 {
    time.num_seconds_from_midnight() as i64
}

/// Absolute distance in calendar days, ignoring time of day.
pub fn calendar_day_distance(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    (a.date_naive() - b.date_naive()).num_days().abs()
}

/// `[00:00, next 00:00)` of the calendar day containing `at`.
pub fn day_bounds(at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = at.date_naive().and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

pub fn in_time_group(at: DateTime<Utc>, window: &TimeGroupWindow) -> bool {
    let t = seconds_since_midnight(at);
    time_seconds(window.start) <= t && t <= time_seconds(window.end)
}

pub fn group_midpoint_seconds(window: &TimeGroupWindow) -> i64 {
    (time_seconds(window.start) + time_seconds(window.end)) / 2
}
