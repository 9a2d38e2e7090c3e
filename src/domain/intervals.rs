//! Simulated clock: week intervals and hourly ticks.
//!
//! All timestamps are UTC. Week intervals are inclusive on both ends, so the
//! next interval starts one nanosecond after the previous one ends.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike, Utc, Weekday};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Splits `[from, to]` into calendar weeks running Monday to Sunday.
///
/// The first interval starts at `from` and may be partial; every later one
/// starts on a Monday at midnight. The last interval ends at the final
/// nanosecond of `to`'s calendar day.
pub fn split_into_weeks(from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<WeekInterval> {
    let mut intervals = Vec::new();

    let first_day = start_of_day(from);
    let last_day = start_of_day(to);
    if first_day > last_day {
        return intervals;
    }

    let mut current = next_monday(first_day);
    if current > last_day {
        intervals.push(WeekInterval {
            start: from,
            end: end_of_day(last_day),
        });
        return intervals;
    }

    if current > from {
        intervals.push(WeekInterval {
            start: from,
            end: current - TimeDelta::nanoseconds(1),
        });
    }

    loop {
        let sunday = current + TimeDelta::days(6);
        if sunday > last_day {
            break;
        }
        intervals.push(WeekInterval {
            start: current,
            end: end_of_day(sunday),
        });
        current += TimeDelta::days(7);
    }

    if current <= last_day {
        intervals.push(WeekInterval {
            start: current,
            end: end_of_day(last_day),
        });
    }

    // `from` later than midnight on a Monday
    if let Some(first) = intervals.first_mut() {
        if first.start < from {
            first.start = from;
        }
    }

    intervals
}

/// Hourly ticks `from, from + 1h, ...` strictly before `to`.
pub fn divide_into_hours(from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let capacity = usize::try_from((to - from).num_hours()).unwrap_or(0) + 1;
    let mut hours = Vec::with_capacity(capacity);
    let mut current = from;
    while current < to {
        hours.push(current);
        current += TimeDelta::hours(1);
    }
    hours
}

pub fn start_of_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Midnight of the day after `ts`.
pub fn next_day_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(ts + TimeDelta::days(1))
}

/// `ts` rounded up to the next midnight, unchanged when already on one.
pub fn ceil_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    let day = start_of_day(ts);
    if day == ts { ts } else { next_day_start(ts) }
}

/// `ts` truncated to a 00:00 or 12:00 boundary.
pub fn half_day_slot(ts: DateTime<Utc>) -> DateTime<Utc> {
    let hour = if ts.hour() >= 12 { 12 } else { 0 };
    start_of_day(ts) + TimeDelta::hours(hour)
}

/// Accepts `YYYY-MM-DD` (midnight), `YYYY-MM-DD HH:MM:SS`, the same with a
/// `T` separator (all UTC), or RFC 3339 with any offset.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::MIN).and_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

pub fn is_weekend(ts: DateTime<Utc>) -> bool {
    matches!(ts.weekday(), Weekday::Sat | Weekday::Sun)
}

fn end_of_day(day: DateTime<Utc>) -> DateTime<Utc> {
    day + TimeDelta::days(1) - TimeDelta::nanoseconds(1)
}

fn next_monday(day: DateTime<Utc>) -> DateTime<Utc> {
    let days_until = (7 - day.weekday().num_days_from_monday()) % 7;
    day + TimeDelta::days(i64::from(days_until))
}
