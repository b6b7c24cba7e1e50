//! Parsing of `--since` / `--until` style timestamps

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{ReaderError, Result};

/// Parse a user-supplied point in time relative to `now`
///
/// Accepted forms:
/// - `now`
/// - relative offsets: `-30s`, `-15m`, `-2h`, `-1d`, or `15m ago`
/// - RFC 3339: `2024-03-01T12:00:00Z`
/// - `2024-03-01` (midnight UTC) and `2024-03-01 12:00[:00]` (UTC)
/// - epoch seconds (up to 10 digits) or epoch milliseconds (13 digits)
pub fn parse_timestamp(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    let invalid = || ReaderError::InvalidTimestamp(input.to_string());

    if input.is_empty() {
        return Err(invalid());
    }
    if input.eq_ignore_ascii_case("now") {
        return Ok(now);
    }

    if let Some(offset) = input.strip_prefix('-') {
        if let Some(duration) = parse_offset(offset) {
            return now.checked_sub_signed(duration).ok_or_else(invalid);
        }
    }
    if let Some(offset) = input.strip_suffix("ago") {
        return parse_offset(offset.trim())
            .and_then(|duration| now.checked_sub_signed(duration))
            .ok_or_else(invalid);
    }

    if input.bytes().all(|b| b.is_ascii_digit()) {
        let value: i64 = input.parse().map_err(|_| invalid())?;
        let parsed = match input.len() {
            1..=10 => Utc.timestamp_opt(value, 0).single(),
            13 => Utc.timestamp_millis_opt(value).single(),
            _ => None,
        };
        return parsed.ok_or_else(invalid);
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
        return Ok(Utc.from_utc_datetime(&midnight));
    }

    Err(invalid())
}

/// `15m`, `2h`, `30s`, `1d`, `1w` as a duration
fn parse_offset(offset: &str) -> Option<Duration> {
    let offset = offset.trim();
    let split = offset.find(|c: char| !c.is_ascii_digit())?;
    let (amount, unit) = offset.split_at(split);
    let amount: i64 = amount.parse().ok()?;

    match unit.trim() {
        "s" | "sec" | "secs" | "second" | "seconds" => Duration::try_seconds(amount),
        "m" | "min" | "mins" | "minute" | "minutes" => Duration::try_minutes(amount),
        "h" | "hr" | "hrs" | "hour" | "hours" => Duration::try_hours(amount),
        "d" | "day" | "days" => Duration::try_days(amount),
        "w" | "week" | "weeks" => Duration::try_weeks(amount),
        _ => None,
    }
}
