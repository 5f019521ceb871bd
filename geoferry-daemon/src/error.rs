use thiserror::Error;

use geoferry_sync::SyncError;

/// Error surface for startup checks and the controller runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("config error: {0}")]
    Config(#[from] geoferry_core::ConfigError),

    /// A startup connectivity check failed; the loop was never started.
    #[error("startup check failed for {store} store: {source}")]
    Startup {
        store: &'static str,
        #[source]
        source: SyncError,
    },

    #[error("I/O error in {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{task} task join failure: {reason}")]
    Join { task: &'static str, reason: String },
}

pub(crate) fn io_err(context: &'static str, source: std::io::Error) -> DaemonError {
    DaemonError::Io { context, source }
}

pub(crate) fn join_err(task: &'static str, err: tokio::task::JoinError) -> DaemonError {
    DaemonError::Join {
        task,
        reason: err.to_string(),
    }
}
