//! In-memory source and sink with scripted failures.
//!
//! Both types are cheap handles over shared state: clone one, hand the clone
//! to a [`crate::pipeline::SyncContext`], and keep the original to inspect
//! what the pipeline did.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use geoferry_core::{CanonicalRecord, DeviceId, SourceKey};

use crate::error::{SinkError, SourceError};
use crate::sink::SinkStore;
use crate::source::{Snapshot, SourceStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decrement a pending-failure budget; true when this call should fail.
fn take_failure(budget: &mut u32) -> bool {
    if *budget > 0 {
        *budget -= 1;
        true
    } else {
        false
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SourceState {
    entries: Snapshot,
    fail_fetches: u32,
    fail_removes: u32,
    fetch_calls: usize,
    remove_calls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    state: Arc<Mutex<SourceState>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<SourceKey>, entry: Value) {
        lock(&self.state).entries.insert(key.into(), entry);
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.state)
            .entries
            .contains_key(&SourceKey::from(key))
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The next `n` calls to `fetch_all` fail with a 503.
    pub fn fail_next_fetches(&self, n: u32) {
        lock(&self.state).fail_fetches = n;
    }

    /// The next `n` calls to `remove` fail with a 503.
    pub fn fail_next_removes(&self, n: u32) {
        lock(&self.state).fail_removes = n;
    }

    pub fn fetch_calls(&self) -> usize {
        lock(&self.state).fetch_calls
    }

    pub fn remove_calls(&self) -> usize {
        lock(&self.state).remove_calls
    }
}

impl SourceStore for MemorySource {
    fn fetch_all(&self) -> Result<Snapshot, SourceError> {
        let mut state = lock(&self.state);
        state.fetch_calls += 1;
        if take_failure(&mut state.fail_fetches) {
            return Err(SourceError::Status {
                code: 503,
                body: "scripted fetch failure".to_string(),
            });
        }
        Ok(state.entries.clone())
    }

    fn remove(&self, key: &SourceKey) -> Result<(), SourceError> {
        let mut state = lock(&self.state);
        state.remove_calls += 1;
        if take_failure(&mut state.fail_removes) {
            return Err(SourceError::Status {
                code: 503,
                body: "scripted remove failure".to_string(),
            });
        }
        state.entries.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SinkState {
    devices: HashSet<DeviceId>,
    rows: Vec<CanonicalRecord>,
    fail_inserts: u32,
    fail_lookups: u32,
    insert_calls: usize,
    lookup_calls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<SinkState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_device(&self, device_id: impl Into<DeviceId>) {
        lock(&self.state).devices.insert(device_id.into());
    }

    pub fn rows(&self) -> Vec<CanonicalRecord> {
        lock(&self.state).rows.clone()
    }

    /// The next `n` inserts fail with a transport error.
    pub fn fail_next_inserts(&self, n: u32) {
        lock(&self.state).fail_inserts = n;
    }

    /// The next `n` lookups (device, location or ping) fail with a
    /// transport error.
    pub fn fail_next_lookups(&self, n: u32) {
        lock(&self.state).fail_lookups = n;
    }

    pub fn insert_calls(&self) -> usize {
        lock(&self.state).insert_calls
    }

    /// Device plus location lookups, not counting `ping`.
    pub fn lookup_calls(&self) -> usize {
        lock(&self.state).lookup_calls
    }

    fn lookup<T>(&self, f: impl FnOnce(&SinkState) -> T) -> Result<T, SinkError> {
        let mut state = lock(&self.state);
        state.lookup_calls += 1;
        if take_failure(&mut state.fail_lookups) {
            return Err(SinkError::Transport("scripted lookup failure".to_string()));
        }
        Ok(f(&state))
    }
}

impl SinkStore for MemorySink {
    fn ping(&self) -> Result<(), SinkError> {
        if take_failure(&mut lock(&self.state).fail_lookups) {
            return Err(SinkError::Transport("scripted ping failure".to_string()));
        }
        Ok(())
    }

    fn device_exists(&self, device_id: &DeviceId) -> Result<bool, SinkError> {
        self.lookup(|state| state.devices.contains(device_id))
    }

    fn location_exists(&self, record: &CanonicalRecord) -> Result<bool, SinkError> {
        self.lookup(|state| {
            state.rows.iter().any(|row| {
                row.device_id == record.device_id
                    && row.latitude == record.latitude
                    && row.longitude == record.longitude
                    && row.timestamp == record.timestamp
            })
        })
    }

    fn insert_location(&self, record: &CanonicalRecord) -> Result<(), SinkError> {
        let mut state = lock(&self.state);
        state.insert_calls += 1;
        if take_failure(&mut state.fail_inserts) {
            return Err(SinkError::Transport("scripted insert failure".to_string()));
        }
        state.rows.push(record.clone());
        Ok(())
    }
}
