//! Store wiring and the one-shot connectivity checks run before the loop.

use serde::Serialize;

use geoferry_core::Config;
use geoferry_sync::{
    CycleOptions, FirebaseSource, SinkError, SourceError, SupabaseSink, SyncContext, SyncError,
};

use crate::error::DaemonError;

/// Build the HTTP-backed context for `config`. No network traffic.
pub fn build_context(config: &Config) -> SyncContext {
    let timeout = config.sync.request_timeout();
    SyncContext::new(
        Box::new(FirebaseSource::new(&config.source, timeout)),
        Box::new(SupabaseSink::new(&config.sink, timeout)),
        CycleOptions::from(&config.sync),
    )
}

/// Result of probing both stores, one entry per store.
#[derive(Debug)]
pub struct Connectivity {
    pub sink: Result<(), SinkError>,
    /// Number of pending source entries on success.
    pub source: Result<usize, SourceError>,
}

impl Connectivity {
    pub fn is_ok(&self) -> bool {
        self.sink.is_ok() && self.source.is_ok()
    }
}

/// Flattened view of [`Connectivity`] for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityReport {
    pub sink_ok: bool,
    pub sink_error: Option<String>,
    pub source_ok: bool,
    pub source_error: Option<String>,
    pub pending: Option<usize>,
}

impl From<&Connectivity> for ConnectivityReport {
    fn from(c: &Connectivity) -> Self {
        Self {
            sink_ok: c.sink.is_ok(),
            sink_error: c.sink.as_ref().err().map(ToString::to_string),
            source_ok: c.source.is_ok(),
            source_error: c.source.as_ref().err().map(ToString::to_string),
            pending: c.source.as_ref().ok().copied(),
        }
    }
}

/// Probe both stores without stopping at the first failure.
pub fn probe(ctx: &SyncContext) -> Connectivity {
    let sink = ctx.sink().ping();
    let source = ctx.source().fetch_all().map(|snapshot| snapshot.len());
    Connectivity { sink, source }
}

/// Sink ping, then a source fetch. Returns the pending-record count.
pub fn check_connectivity(ctx: &SyncContext) -> Result<usize, DaemonError> {
    ctx.sink().ping().map_err(|e| DaemonError::Startup {
        store: "sink",
        source: SyncError::from(e),
    })?;
    tracing::info!("sink store reachable");

    let pending = ctx
        .source()
        .fetch_all()
        .map_err(|e| DaemonError::Startup {
            store: "source",
            source: SyncError::from(e),
        })?
        .len();
    tracing::info!(pending, "source store reachable");
    Ok(pending)
}
