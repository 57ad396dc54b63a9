//! Calendar date helpers shared by the filter, the writer and the orchestrator.
//!
//! Timestamps in the store are "ISO-ish": full RFC 3339, naive date-times with
//! either separator, or bare dates. A timestamp with an offset is truncated in
//! that offset, so `2019-08-14T23:30:00-05:00` is the 14th.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use edusync_common::{Result, SyncError};
use serde_json::{Map, Value};
use tracing::warn;

use crate::clock::Clock;

/// Invocation payload key naming the day to sync.
pub const EXECUTION_DATE_KEY: &str = "executionDate";

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a timestamp string down to its calendar date.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.date_naive());
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Interpret a JSON value as a date: strings as timestamps, numbers as Unix
/// seconds (UTC). Anything else, or an unparseable string, is malformed.
pub fn date_from_value(field: &str, value: &Value) -> Result<NaiveDate> {
    let parsed = match value {
        Value::String(s) => parse_calendar_date(s),
        Value::Number(n) => n.as_f64().and_then(date_from_epoch_seconds),
        _ => None,
    };

    parsed.ok_or_else(|| {
        let shown = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        SyncError::malformed_timestamp(field, shown)
    })
}

fn date_from_epoch_seconds(secs: f64) -> Option<NaiveDate> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos).map(|dt| dt.date_naive())
}

/// The day a record must have been updated on: `target - 1` calendar day.
pub fn cutoff_for(target: NaiveDate) -> Result<NaiveDate> {
    target
        .checked_sub_days(Days::new(1))
        .ok_or_else(|| SyncError::InvalidPayload(format!("no day precedes {}", target)))
}

/// Pick the target date from the payload, falling back to the clock's today.
///
/// A value that is present but unparseable falls back too, with a warning.
pub fn resolve_target_date(payload: &Map<String, Value>, clock: &dyn Clock) -> NaiveDate {
    match payload.get(EXECUTION_DATE_KEY) {
        None | Some(Value::Null) => clock.now().date_naive(),
        Some(value) => match date_from_value(EXECUTION_DATE_KEY, value) {
            Ok(date) => date,
            Err(e) => {
                let today = clock.now().date_naive();
                warn!(error = %e, fallback = %today, "Ignoring unparseable execution date");
                today
            },
        },
    }
}
