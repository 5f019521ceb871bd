//! One migration cycle: fetch → normalize → guard → commit → remove.
//!
//! This is the shared cycle entrypoint used by the daemon loop and by
//! `geoferry once`. Cross-cycle state lives in [`SyncContext`], built once
//! per process and passed back in for every cycle.
//!
//! Ordering is commit-then-acknowledge: a source key is only deleted after
//! the sink accepted its row.

use std::time::Instant;

use serde::Serialize;

use geoferry_core::{normalize_entry, DeviceId, RejectionReason, SourceKey, SyncSettings};

use crate::error::SourceError;
use crate::guard::{IdempotencyGuard, SeenSet, SkipReason};
use crate::sink::SinkStore;
use crate::source::SourceStore;
use crate::writer::{CommitOutcome, SinkWriter};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Per-run switches for the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOptions {
    /// Delete committed records from the source.
    pub cleanup: bool,
    /// Evaluate everything, write nothing.
    pub dry_run: bool,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            cleanup: true,
            dry_run: false,
        }
    }
}

impl From<&SyncSettings> for CycleOptions {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            cleanup: settings.cleanup,
            dry_run: settings.dry_run,
        }
    }
}

/// Everything a cycle needs, owned in one place for the life of the process.
pub struct SyncContext {
    source: Box<dyn SourceStore>,
    sink: Box<dyn SinkStore>,
    options: CycleOptions,
    seen: SeenSet,
}

impl SyncContext {
    pub fn new(
        source: Box<dyn SourceStore>,
        sink: Box<dyn SinkStore>,
        options: CycleOptions,
    ) -> Self {
        Self {
            source,
            sink,
            options,
            seen: SeenSet::new(),
        }
    }

    pub fn source(&self) -> &dyn SourceStore {
        self.source.as_ref()
    }

    pub fn sink(&self) -> &dyn SinkStore {
        self.sink.as_ref()
    }

    pub fn options(&self) -> CycleOptions {
        self.options
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to a committed record's source entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum Removal {
    Removed,
    /// Logged and ignored: the sink-side check suppresses it next cycle.
    Failed(String),
    /// Cleanup switched off.
    Disabled,
}

/// Error-taxonomy class of a per-record outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeClass {
    ValidationRejection,
    SkipSuppression,
    Migrated,
    TransientSinkFailure,
}

/// Classified result for one source key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Rejected {
        key: SourceKey,
        reason: RejectionReason,
    },
    Skipped {
        key: SourceKey,
        device_id: DeviceId,
        reason: SkipReason,
    },
    Migrated {
        key: SourceKey,
        device_id: DeviceId,
        removal: Removal,
    },
    WouldMigrate {
        key: SourceKey,
        device_id: DeviceId,
    },
    Error {
        key: SourceKey,
        device_id: DeviceId,
        error: String,
    },
}

impl RecordOutcome {
    pub fn key(&self) -> &SourceKey {
        match self {
            RecordOutcome::Rejected { key, .. }
            | RecordOutcome::Skipped { key, .. }
            | RecordOutcome::Migrated { key, .. }
            | RecordOutcome::WouldMigrate { key, .. }
            | RecordOutcome::Error { key, .. } => key,
        }
    }

    pub fn device_id(&self) -> Option<&DeviceId> {
        match self {
            RecordOutcome::Rejected { .. } => None,
            RecordOutcome::Skipped { device_id, .. }
            | RecordOutcome::Migrated { device_id, .. }
            | RecordOutcome::WouldMigrate { device_id, .. }
            | RecordOutcome::Error { device_id, .. } => Some(device_id),
        }
    }

    pub fn class(&self) -> OutcomeClass {
        match self {
            RecordOutcome::Rejected { .. } => OutcomeClass::ValidationRejection,
            RecordOutcome::Skipped { .. } => OutcomeClass::SkipSuppression,
            RecordOutcome::Migrated { .. } | RecordOutcome::WouldMigrate { .. } => {
                OutcomeClass::Migrated
            }
            RecordOutcome::Error { .. } => OutcomeClass::TransientSinkFailure,
        }
    }

    /// Log tag: `rejected`, `skipped`, `migrated`, `would_migrate` or `error`.
    pub fn tag(&self) -> &'static str {
        match self {
            RecordOutcome::Rejected { .. } => "rejected",
            RecordOutcome::Skipped { .. } => "skipped",
            RecordOutcome::Migrated { .. } => "migrated",
            RecordOutcome::WouldMigrate { .. } => "would_migrate",
            RecordOutcome::Error { .. } => "error",
        }
    }

    /// Short human reason, empty for a clean migration.
    pub fn reason(&self) -> String {
        match self {
            RecordOutcome::Rejected { reason, .. } => reason.to_string(),
            RecordOutcome::Skipped { reason, .. } => reason.to_string(),
            RecordOutcome::Migrated { removal, .. } => match removal {
                Removal::Removed | Removal::Disabled => String::new(),
                Removal::Failed(err) => format!("source delete failed: {err}"),
            },
            RecordOutcome::WouldMigrate { .. } => "dry_run".to_string(),
            RecordOutcome::Error { error, .. } => error.clone(),
        }
    }
}

/// Summary of one successful cycle (the fetch succeeded).
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// Entries in the fetched snapshot.
    pub fetched: usize,
    /// Entries skipped up front because their key is in the seen-set.
    pub already_seen: usize,
    pub outcomes: Vec<RecordOutcome>,
    pub duration_ms: u128,
}

impl CycleReport {
    /// Keys that went through the pipeline this cycle.
    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn migrated(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Migrated { .. }))
    }

    pub fn would_migrate(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::WouldMigrate { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Skipped { .. }))
    }

    pub fn rejected(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Rejected { .. }))
    }

    pub fn errors(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Error { .. }))
    }

    pub fn removed(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                RecordOutcome::Migrated {
                    removal: Removal::Removed,
                    ..
                }
            )
        })
    }

    pub fn remove_failed(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                RecordOutcome::Migrated {
                    removal: Removal::Failed(_),
                    ..
                }
            )
        })
    }

    fn count(&self, pred: impl Fn(&RecordOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

// ---------------------------------------------------------------------------
// run_cycle
// ---------------------------------------------------------------------------

/// Run one full cycle.
///
/// A fetch failure is the only error returned; it leaves the seen-set
/// untouched. Every per-record problem is classified into the report.
pub fn run_cycle(ctx: &mut SyncContext) -> Result<CycleReport, SourceError> {
    let started = Instant::now();
    let snapshot = ctx.source.fetch_all()?;

    let mut report = CycleReport {
        fetched: snapshot.len(),
        ..CycleReport::default()
    };

    for (key, entry) in snapshot {
        if ctx.seen.contains(&key) {
            report.already_seen += 1;
            continue;
        }
        let outcome = process_entry(ctx, key, &entry);
        if let RecordOutcome::Migrated { key, .. } = &outcome {
            ctx.seen.insert(key.clone());
        }
        report.outcomes.push(outcome);
    }

    report.duration_ms = started.elapsed().as_millis();
    Ok(report)
}

fn process_entry(ctx: &SyncContext, key: SourceKey, entry: &serde_json::Value) -> RecordOutcome {
    let record = match normalize_entry(entry) {
        Ok(record) => record,
        Err(reason) => return RecordOutcome::Rejected { key, reason },
    };
    let device_id = record.device_id.clone();

    let guard = IdempotencyGuard::new(&ctx.seen, ctx.sink.as_ref());
    match guard.should_skip(&key, &device_id) {
        Ok(Some(reason)) => {
            return RecordOutcome::Skipped {
                key,
                device_id,
                reason,
            }
        }
        Ok(None) => {}
        Err(err) => {
            return RecordOutcome::Error {
                key,
                device_id,
                error: err.to_string(),
            }
        }
    }
    match guard.already_committed(&record) {
        Ok(true) => {
            return RecordOutcome::Skipped {
                key,
                device_id,
                reason: SkipReason::AlreadyCommitted,
            }
        }
        Ok(false) => {}
        Err(err) => {
            return RecordOutcome::Error {
                key,
                device_id,
                error: err.to_string(),
            }
        }
    }

    let writer = SinkWriter::new(&guard, ctx.sink.as_ref(), ctx.options.dry_run);
    match writer.commit(&record) {
        CommitOutcome::Committed => {
            let removal = remove_committed(ctx, &key);
            RecordOutcome::Migrated {
                key,
                device_id,
                removal,
            }
        }
        CommitOutcome::AlreadyPresent => RecordOutcome::Skipped {
            key,
            device_id,
            reason: SkipReason::AlreadyCommitted,
        },
        CommitOutcome::WouldCommit => RecordOutcome::WouldMigrate { key, device_id },
        CommitOutcome::Failed(err) => RecordOutcome::Error {
            key,
            device_id,
            error: err.to_string(),
        },
    }
}

/// Best-effort acknowledge of a committed record.
fn remove_committed(ctx: &SyncContext, key: &SourceKey) -> Removal {
    if !ctx.options.cleanup {
        return Removal::Disabled;
    }
    match ctx.source.remove(key) {
        Ok(()) => Removal::Removed,
        Err(err) => {
            tracing::warn!("committed {key} but could not delete it from the source: {err}");
            Removal::Failed(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// preview
// ---------------------------------------------------------------------------

/// Normalizer verdict for one pending entry, without touching the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingEntry {
    pub key: SourceKey,
    pub device_id: Option<DeviceId>,
    pub timestamp: Option<String>,
    /// `None` when the entry would be handed to the guard.
    pub rejection: Option<RejectionReason>,
}

/// Fetch the snapshot and normalize every entry. Read-only.
pub fn preview(source: &dyn SourceStore) -> Result<Vec<PendingEntry>, SourceError> {
    let snapshot = source.fetch_all()?;
    Ok(snapshot
        .into_iter()
        .map(|(key, entry)| match normalize_entry(&entry) {
            Ok(record) => PendingEntry {
                key,
                device_id: Some(record.device_id),
                timestamp: Some(record.timestamp),
                rejection: None,
            },
            Err(reason) => PendingEntry {
                key,
                device_id: None,
                timestamp: None,
                rejection: Some(reason),
            },
        })
        .collect())
}
