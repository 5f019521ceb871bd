//! Idempotency guard: decides whether a record must not be written.
//!
//! Two layers:
//! 1. [`SeenSet`] — keys this process already committed (cheap, forgotten on restart).
//! 2. The sink itself — device registration and the 4-tuple existence query.
//!
//! After a restart only layer 2 protects against duplicates. The existence
//! query and the later insert are not atomic, so two writers racing on the
//! same tuple can still both insert.

use std::collections::HashSet;

use serde::Serialize;

use geoferry_core::{CanonicalRecord, DeviceId, SourceKey};

use crate::error::SinkError;
use crate::sink::SinkStore;

/// Source keys confirmed migrated during this process's lifetime.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    keys: HashSet<SourceKey>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &SourceKey) -> bool {
        self.keys.contains(key)
    }

    /// Only called after the sink confirmed the commit.
    pub(crate) fn insert(&mut self, key: SourceKey) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Why a valid record was deliberately not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadySeen,
    UnregisteredDevice,
    AlreadyCommitted,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadySeen => "already_seen",
            SkipReason::UnregisteredDevice => "unregistered_device",
            SkipReason::AlreadyCommitted => "already_committed",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct IdempotencyGuard<'a> {
    seen: &'a SeenSet,
    sink: &'a dyn SinkStore,
}

impl<'a> IdempotencyGuard<'a> {
    pub fn new(seen: &'a SeenSet, sink: &'a dyn SinkStore) -> Self {
        Self { seen, sink }
    }

    /// Seen-set first so a known key never costs a sink query.
    ///
    /// A sink error is returned as-is: an unreachable device table must not
    /// be mistaken for an unregistered device.
    pub fn should_skip(
        &self,
        key: &SourceKey,
        device_id: &DeviceId,
    ) -> Result<Option<SkipReason>, SinkError> {
        if self.seen.contains(key) {
            return Ok(Some(SkipReason::AlreadySeen));
        }
        if !self.sink.device_exists(device_id)? {
            return Ok(Some(SkipReason::UnregisteredDevice));
        }
        Ok(None)
    }

    /// Does the sink already hold a row with this record's 4-tuple?
    pub fn already_committed(&self, record: &CanonicalRecord) -> Result<bool, SinkError> {
        self.sink.location_exists(record)
    }
}
