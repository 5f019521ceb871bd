//! Sink writer: existence-gated insert of one canonical record.
//!
//! ## `commit` — 3-step protocol
//!
//! 1. Re-check the sink for the record's 4-tuple (closes most of the gap
//!    since the guard's earlier check; not transactional).
//! 2. Present → [`CommitOutcome::AlreadyPresent`]; dry-run → [`CommitOutcome::WouldCommit`].
//! 3. Insert the row.
//!
//! A failure at any step is returned as [`CommitOutcome::Failed`]; the caller
//! must then neither mark the key seen nor delete it from the source.

use geoferry_core::CanonicalRecord;

use crate::error::SinkError;
use crate::guard::IdempotencyGuard;
use crate::sink::SinkStore;

// ---------------------------------------------------------------------------
// Commit outcome
// ---------------------------------------------------------------------------

/// Outcome of an individual commit attempt.
#[derive(Debug)]
pub enum CommitOutcome {
    /// The row was inserted.
    Committed,
    /// The re-check found the row already in the sink; nothing written.
    AlreadyPresent,
    /// Dry-run mode: the row *would* have been inserted.
    WouldCommit,
    /// The re-check or the insert failed; the record stays pending.
    Failed(SinkError),
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed)
    }
}

// ---------------------------------------------------------------------------
// SinkWriter
// ---------------------------------------------------------------------------

pub struct SinkWriter<'a> {
    guard: &'a IdempotencyGuard<'a>,
    sink: &'a dyn SinkStore,
    dry_run: bool,
}

impl<'a> SinkWriter<'a> {
    pub fn new(guard: &'a IdempotencyGuard<'a>, sink: &'a dyn SinkStore, dry_run: bool) -> Self {
        Self {
            guard,
            sink,
            dry_run,
        }
    }

    pub fn commit(&self, record: &CanonicalRecord) -> CommitOutcome {
        match self.guard.already_committed(record) {
            Ok(true) => {
                tracing::debug!(
                    "row for {} at {} already present",
                    record.device_id,
                    record.timestamp
                );
                return CommitOutcome::AlreadyPresent;
            }
            Ok(false) => {}
            Err(err) => return CommitOutcome::Failed(err),
        }

        if self.dry_run {
            tracing::info!(
                "[dry-run] would insert row for {} at {}",
                record.device_id,
                record.timestamp
            );
            return CommitOutcome::WouldCommit;
        }

        match self.sink.insert_location(record) {
            Ok(()) => CommitOutcome::Committed,
            Err(err) => CommitOutcome::Failed(err),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::SeenSet;
    use crate::memory::MemorySink;
    use serde_json::json;

    fn record() -> CanonicalRecord {
        geoferry_core::normalize_entry(&json!({
            "childID": "dev1", "lat": 12.5, "long": 77.4, "speed": 3.2,
            "timestamp": "2025-10-06 01:18:13",
        }))
        .expect("valid record")
    }

    fn commit_with(sink: &MemorySink, dry_run: bool) -> CommitOutcome {
        let seen = SeenSet::new();
        let guard = IdempotencyGuard::new(&seen, sink);
        SinkWriter::new(&guard, sink, dry_run).commit(&record())
    }

    #[test]
    fn first_commit_inserts_row() {
        let sink = MemorySink::new();
        assert!(commit_with(&sink, false).is_committed());
        assert_eq!(sink.rows(), vec![record()]);
    }

    #[test]
    fn second_commit_same_tuple_is_already_present() {
        let sink = MemorySink::new();
        commit_with(&sink, false);
        let outcome = commit_with(&sink, false);
        assert!(matches!(outcome, CommitOutcome::AlreadyPresent));
        assert_eq!(sink.rows().len(), 1);
        assert_eq!(sink.insert_calls(), 1);
    }

    #[test]
    fn dry_run_does_not_insert() {
        let sink = MemorySink::new();
        let outcome = commit_with(&sink, true);
        assert!(matches!(outcome, CommitOutcome::WouldCommit));
        assert!(sink.rows().is_empty());
        assert_eq!(sink.insert_calls(), 0);
    }

    #[test]
    fn insert_failure_is_reported_not_raised() {
        let sink = MemorySink::new();
        sink.fail_next_inserts(1);
        let outcome = commit_with(&sink, false);
        assert!(matches!(outcome, CommitOutcome::Failed(SinkError::Transport(_))));
        assert!(sink.rows().is_empty());
    }

    #[test]
    fn recheck_failure_skips_the_insert() {
        let sink = MemorySink::new();
        sink.fail_next_lookups(1);
        let outcome = commit_with(&sink, false);
        assert!(matches!(outcome, CommitOutcome::Failed(_)));
        assert_eq!(sink.insert_calls(), 0);
    }
}
