//! Value parsing helpers for loosely-typed source records.
//!
//! Open-data APIs are inconsistent about types: coordinates arrive as
//! numbers or strings, offense codes as integers or strings, and timestamps
//! in a handful of formats. These helpers accept all of them.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;

/// Naive datetime layouts tried in order. All are interpreted as UTC.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Parses a timestamp string.
///
/// Accepts RFC 3339, Socrata floating timestamps (with or without
/// fractional seconds), space-separated timestamps, the LAPD CSV
/// `MM/DD/YYYY HH:MM:SS AM` layout, and bare `YYYY-MM-DD` dates (midnight).
///
/// The reported offset is kept so callers can read the local clock time.
/// Timestamps without an offset get `+00:00`.
#[must_use]
pub fn parse_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Parses an `HHMM` time of day. Short values are zero-padded, so `"930"`
/// and `930` both mean 09:30.
#[must_use]
pub fn parse_hhmm(value: &Value) -> Option<NaiveTime> {
    let digits = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.as_u64()?.to_string(),
        _ => return None,
    };
    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{digits:0>4}");
    let hour = padded[..2].parse::<u32>().ok()?;
    let min = padded[2..].parse::<u32>().ok()?;
    NaiveTime::from_hms_opt(hour, min, 0)
}

/// Reads a float from a JSON number or numeric string. Non-finite values
/// are rejected.
#[must_use]
pub fn value_as_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}

/// Reads an offense code from a JSON string or integer. Blank strings
/// yield `None`.
#[must_use]
pub fn value_as_code(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}
