//! Raw source record → [`CanonicalRecord`].
//!
//! ## Field mapping
//!
//! | source      | canonical    | rule                                   |
//! |-------------|--------------|----------------------------------------|
//! | `childID`   | `device_id`  | required, non-empty string (or number) |
//! | `lat`       | `latitude`   | required, number or numeric string     |
//! | `long`      | `longitude`  | required, number or numeric string     |
//! | `speed`     | `speed`      | optional, left `None` when absent      |
//! | `timestamp` | `timestamp`  | required, `YYYY-MM-DD HH:MM:SS`        |
//!
//! Checks run in that order of severity: presence first, then the timestamp
//! shape, then numeric coercion. Nothing in here panics; every failure is a
//! [`RejectionReason`].

use chrono::{NaiveDateTime, Timelike};
use serde_json::Value;

use crate::types::{CanonicalRecord, DeviceId, RawRecord, RejectionReason};

pub const FIELD_DEVICE_ID: &str = "childID";
pub const FIELD_LATITUDE: &str = "lat";
pub const FIELD_LONGITUDE: &str = "long";
pub const FIELD_SPEED: &str = "speed";
pub const FIELD_TIMESTAMP: &str = "timestamp";

const SOURCE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const CANONICAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Normalize one snapshot entry, which may not even be an object.
pub fn normalize_entry(value: &Value) -> Result<CanonicalRecord, RejectionReason> {
    match value {
        Value::Object(raw) => normalize(raw),
        _ => Err(RejectionReason::NotAnObject),
    }
}

/// Validate and project a raw record.
pub fn normalize(raw: &RawRecord) -> Result<CanonicalRecord, RejectionReason> {
    let device = present(raw, FIELD_DEVICE_ID);
    let lat = present(raw, FIELD_LATITUDE);
    let long = present(raw, FIELD_LONGITUDE);
    let timestamp = present(raw, FIELD_TIMESTAMP);

    let (Some(device), Some(lat), Some(long), Some(timestamp)) = (device, lat, long, timestamp)
    else {
        return Err(RejectionReason::MissingFields);
    };

    let device_id = device_id(device).ok_or(RejectionReason::MissingFields)?;
    let timestamp = match timestamp {
        Value::String(s) if s.is_empty() => return Err(RejectionReason::MissingFields),
        Value::String(s) => parse_timestamp(s).ok_or(RejectionReason::BadTimestamp)?,
        _ => return Err(RejectionReason::BadTimestamp),
    };

    let latitude = coerce_f64(lat).ok_or(RejectionReason::InvalidNumber)?;
    let longitude = coerce_f64(long).ok_or(RejectionReason::InvalidNumber)?;
    let speed = match present(raw, FIELD_SPEED) {
        Some(value) => Some(coerce_f64(value).ok_or(RejectionReason::InvalidNumber)?),
        None => None,
    };

    Ok(CanonicalRecord::new(
        device_id, latitude, longitude, speed, timestamp,
    ))
}

/// Parse `YYYY-MM-DD HH:MM:SS` into `YYYY-MM-DDTHH:MM:SS`.
///
/// The shape is checked byte-by-byte before chrono sees the string, since
/// chrono's `%Y`/`%m` accept widths the source format does not allow.
/// Wall-clock values are carried over untouched; there is no zone handling.
/// Seconds run 00-59; chrono's leap-second `:60` is refused.
pub fn parse_timestamp(input: &str) -> Option<String> {
    if !has_fixed_width_shape(input) {
        return None;
    }
    let parsed = NaiveDateTime::parse_from_str(input, SOURCE_TIMESTAMP_FORMAT).ok()?;
    if parsed.nanosecond() >= 1_000_000_000 {
        return None;
    }
    Some(parsed.format(CANONICAL_TIMESTAMP_FORMAT).to_string())
}

fn has_fixed_width_shape(input: &str) -> bool {
    let bytes = input.as_bytes();
    if bytes.len() != 19 {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        10 => *b == b' ',
        13 | 16 => *b == b':',
        _ => b.is_ascii_digit(),
    })
}

/// Numbers pass through; strings are trimmed and parsed. Non-finite results
/// are refused so they never reach a numeric column.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn present<'a>(raw: &'a RawRecord, field: &str) -> Option<&'a Value> {
    raw.get(field).filter(|v| !v.is_null())
}

fn device_id(value: &Value) -> Option<DeviceId> {
    match value {
        Value::String(s) if !s.is_empty() => Some(DeviceId::from(s.as_str())),
        Value::Number(n) => Some(DeviceId::from(n.to_string())),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
