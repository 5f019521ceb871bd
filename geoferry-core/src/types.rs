//! Domain types for location records moving from the source to the sink.
//!
//! Raw records are kept as untyped JSON maps until the normalizer has
//! validated them; only [`CanonicalRecord`] is allowed near the sink.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque identifier of one pending record inside the source store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceKey(pub String);

impl SourceKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SourceKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SourceKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of a tracking device, as registered in the sink's device table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A record exactly as the source returned it for one key.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Value written to the `source` column of every migrated row.
pub const RECORD_SOURCE: &str = "firebase";

/// Validated, sink-ready projection of a [`RawRecord`].
///
/// Only [`crate::normalize::normalize`] builds these; the fields are public
/// for reading and for serializing into the sink row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub device_id: DeviceId,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    /// `YYYY-MM-DDTHH:MM:SS`, wall-clock values copied from the source.
    pub timestamp: String,
    pub source: String,
}

impl CanonicalRecord {
    pub(crate) fn new(
        device_id: DeviceId,
        latitude: f64,
        longitude: f64,
        speed: Option<f64>,
        timestamp: String,
    ) -> Self {
        Self {
            device_id,
            latitude,
            longitude,
            speed,
            timestamp,
            source: RECORD_SOURCE.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

/// Why a raw record could not be turned into a [`CanonicalRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// `childID`, `lat`, `long` or `timestamp` is absent, null or empty.
    MissingFields,
    /// `timestamp` is not `YYYY-MM-DD HH:MM:SS` or names an impossible instant.
    BadTimestamp,
    /// A coordinate or speed could not be read as a finite number.
    InvalidNumber,
    /// The snapshot entry is not a JSON object at all.
    NotAnObject,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::MissingFields => "missing_fields",
            RejectionReason::BadTimestamp => "bad_timestamp",
            RejectionReason::InvalidNumber => "invalid_number",
            RejectionReason::NotAnObject => "not_an_object",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
