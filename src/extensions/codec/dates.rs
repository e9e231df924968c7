//! Date fields.
//!
//! A number is epoch milliseconds. A string is tried as epoch milliseconds,
//! RFC 3339, then a handful of common naive layouts interpreted as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::extensions::value::GuestValue;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"];

/// Decode a date-bearing field. Unparseable values decode as absent.
pub fn decode_date(value: &GuestValue) -> Option<DateTime<Utc>> {
    match value {
        GuestValue::Number(ms) => from_millis(*ms),
        GuestValue::String(text) => {
            let parsed = parse_date(text);
            if parsed.is_none() && !text.trim().is_empty() {
                tracing::debug!(value = %text, "Ignoring unparseable date");
            }
            parsed
        }
        _ => None,
    }
}

/// Encode a date as epoch milliseconds.
pub fn encode_date(date: &DateTime<Utc>) -> GuestValue {
    GuestValue::Number(date.timestamp_millis() as f64)
}

pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(ms) = text.parse::<i64>() {
        return Utc.timestamp_millis_opt(ms).single();
    }

    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn from_millis(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(ms as i64).single()
}
