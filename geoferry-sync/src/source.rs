//! Source reader/cleaner: snapshot fetch and per-key delete.
//!
//! The source is a Firebase Realtime Database addressed over its REST API:
//!
//! ```text
//! GET    {url}{root}.json?auth=…        → whole snapshot (object, or null when empty)
//! DELETE {url}{root}/{key}.json?auth=…  → remove one record (key percent-encoded)
//! ```
//!
//! `remove` must only ever be called for a key whose record the sink has
//! already committed.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use geoferry_core::{SourceConfig, SourceKey};

use crate::error::{HttpFailure, SourceError};

/// Every pending entry under the source root, keyed by source key.
///
/// Values are left untyped; the normalizer decides what is a record.
pub type Snapshot = BTreeMap<SourceKey, Value>;

/// Read side and acknowledge side of the source queue.
pub trait SourceStore: Send {
    /// Fetch the full current snapshot in one request. Empty store → empty map.
    fn fetch_all(&self) -> Result<Snapshot, SourceError>;

    /// Delete one record.
    fn remove(&self, key: &SourceKey) -> Result<(), SourceError>;
}

/// Turn a decoded snapshot body into a [`Snapshot`].
pub fn snapshot_from_value(value: Value) -> Result<Snapshot, SourceError> {
    match value {
        Value::Null => Ok(Snapshot::new()),
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, entry)| (SourceKey::from(key), entry))
            .collect()),
        other => Err(SourceError::Malformed(format!(
            "expected an object or null at the source root, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Firebase REST
// ---------------------------------------------------------------------------

/// [`SourceStore`] over the Firebase Realtime Database REST API.
pub struct FirebaseSource {
    agent: ureq::Agent,
    base_url: String,
    root: String,
    auth: Option<String>,
}

impl FirebaseSource {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(config: &SourceConfig, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: config.url.trim_end_matches('/').to_string(),
            root: config.root.trim_matches('/').to_string(),
            auth: config.auth.clone().filter(|a| !a.is_empty()),
        }
    }

    /// `{url}/.json` for the database root, `{url}/{root}.json` otherwise.
    pub fn snapshot_url(&self) -> String {
        if self.root.is_empty() {
            format!("{}/.json", self.base_url)
        } else {
            format!("{}/{}.json", self.base_url, self.root)
        }
    }

    /// The key is percent-encoded as a single path segment.
    pub fn record_url(&self, key: &SourceKey) -> String {
        let segment = urlencoding::encode(key.as_str());
        if self.root.is_empty() {
            format!("{}/{}.json", self.base_url, segment)
        } else {
            format!("{}/{}/{}.json", self.base_url, self.root, segment)
        }
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        match &self.auth {
            Some(secret) => request.query("auth", secret),
            None => request,
        }
    }
}

impl SourceStore for FirebaseSource {
    fn fetch_all(&self) -> Result<Snapshot, SourceError> {
        let url = self.snapshot_url();
        tracing::debug!("fetching source snapshot: {url}");
        let response = self
            .authorize(self.agent.get(&url))
            .call()
            .map_err(|e| SourceError::from(HttpFailure::from(e)))?;

        let body = response
            .into_string()
            .map_err(|e| SourceError::Transport(format!("reading snapshot body: {e}")))?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| SourceError::Malformed(format!("snapshot is not JSON: {e}")))?;
        snapshot_from_value(value)
    }

    fn remove(&self, key: &SourceKey) -> Result<(), SourceError> {
        let url = self.record_url(key);
        tracing::debug!("deleting source record: {url}");
        self.authorize(self.agent.delete(&url))
            .call()
            .map_err(|e| SourceError::from(HttpFailure::from(e)))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
