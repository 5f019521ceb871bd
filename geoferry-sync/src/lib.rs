//! # geoferry-sync
//!
//! The migration engine: source reader/cleaner, idempotency guard, sink
//! writer and the single-cycle pipeline that strings them together.
//!
//! Build a [`pipeline::SyncContext`] once, then call [`pipeline::run_cycle`]
//! for every poll. The loop, sleep and halt policy live in `geoferry-daemon`.

pub mod error;
pub mod guard;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod writer;

pub use error::{SinkError, SourceError, SyncError};
pub use guard::{IdempotencyGuard, SeenSet, SkipReason};
pub use pipeline::{
    preview, run_cycle, CycleOptions, CycleReport, OutcomeClass, PendingEntry, RecordOutcome,
    Removal, SyncContext,
};
pub use sink::{SinkStore, SupabaseSink};
pub use source::{FirebaseSource, Snapshot, SourceStore};
pub use writer::{CommitOutcome, SinkWriter};
