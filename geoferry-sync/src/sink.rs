//! Sink store transport: device lookup, location lookup, insert.
//!
//! The sink is a Postgres database exposed through PostgREST (Supabase):
//!
//! ```text
//! GET  /rest/v1/{devices}?select=device_id&device_id=eq.{id}&limit=1
//! GET  /rest/v1/{locations}?select=id&device_id=eq.…&latitude=eq.…&longitude=eq.…&timestamp=eq.…&limit=1
//! POST /rest/v1/{locations}        (Prefer: return=minimal)
//! ```
//!
//! No unique constraint is assumed on the location table; duplicate
//! suppression lives in [`crate::guard`] and [`crate::writer`].

use std::time::Duration;

use serde_json::Value;

use geoferry_core::{CanonicalRecord, DeviceId, SinkConfig};

use crate::error::{HttpFailure, SinkError};

/// The three operations the pipeline consumes, plus a connectivity probe.
pub trait SinkStore: Send {
    /// Cheap authenticated read used by the startup check.
    fn ping(&self) -> Result<(), SinkError>;

    /// Is `device_id` registered in the device table?
    fn device_exists(&self, device_id: &DeviceId) -> Result<bool, SinkError>;

    /// Is there a row matching `(device_id, latitude, longitude, timestamp)`?
    fn location_exists(&self, record: &CanonicalRecord) -> Result<bool, SinkError>;

    /// Insert one location row.
    fn insert_location(&self, record: &CanonicalRecord) -> Result<(), SinkError>;
}

// ---------------------------------------------------------------------------
// PostgREST
// ---------------------------------------------------------------------------

/// [`SinkStore`] over Supabase's PostgREST endpoint.
pub struct SupabaseSink {
    agent: ureq::Agent,
    rest_url: String,
    api_key: String,
    devices_table: String,
    locations_table: String,
}

impl SupabaseSink {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(config: &SinkConfig, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            rest_url: format!("{}/rest/v1", config.url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            devices_table: config.devices_table.clone(),
            locations_table: config.locations_table.clone(),
        }
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    fn authed(&self, request: ureq::Request) -> ureq::Request {
        request
            .set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", self.api_key))
    }

    /// Run a filtered select and report whether any row came back.
    fn any_rows(&self, request: ureq::Request) -> Result<bool, SinkError> {
        let response = self
            .authed(request)
            .call()
            .map_err(|e| SinkError::from(HttpFailure::from(e)))?;
        let rows: Value = response
            .into_json()
            .map_err(|e| SinkError::Malformed(format!("response is not JSON: {e}")))?;
        match rows {
            Value::Array(rows) => Ok(!rows.is_empty()),
            other => Err(SinkError::Malformed(format!(
                "expected a JSON array of rows, got {other}"
            ))),
        }
    }
}

/// PostgREST equality filter value.
fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

impl SinkStore for SupabaseSink {
    fn ping(&self) -> Result<(), SinkError> {
        let request = self
            .agent
            .get(&self.table_url(&self.devices_table))
            .query("select", "device_id")
            .query("limit", "1");
        self.any_rows(request).map(|_| ())
    }

    fn device_exists(&self, device_id: &DeviceId) -> Result<bool, SinkError> {
        let request = self
            .agent
            .get(&self.table_url(&self.devices_table))
            .query("select", "device_id")
            .query("device_id", &eq(device_id))
            .query("limit", "1");
        self.any_rows(request)
    }

    fn location_exists(&self, record: &CanonicalRecord) -> Result<bool, SinkError> {
        let request = self
            .agent
            .get(&self.table_url(&self.locations_table))
            .query("select", "id")
            .query("device_id", &eq(&record.device_id))
            .query("latitude", &eq(record.latitude))
            .query("longitude", &eq(record.longitude))
            .query("timestamp", &eq(&record.timestamp))
            .query("limit", "1");
        self.any_rows(request)
    }

    fn insert_location(&self, record: &CanonicalRecord) -> Result<(), SinkError> {
        tracing::debug!(
            "inserting location row for {} at {}",
            record.device_id,
            record.timestamp
        );
        self.authed(self.agent.post(&self.table_url(&self.locations_table)))
            .set("Prefer", "return=minimal")
            .send_json(record)
            .map_err(|e| SinkError::from(HttpFailure::from(e)))?;
        Ok(())
    }
}
