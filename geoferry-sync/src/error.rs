//! Error types for geoferry-sync.

use thiserror::Error;

/// Failure talking to the source store (fetch or delete).
#[derive(Debug, Error)]
pub enum SourceError {
    /// Connection, DNS, TLS or timeout failure; no HTTP status was received.
    #[error("source transport error: {0}")]
    Transport(String),

    /// The source answered with a non-success status.
    #[error("source returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// The body was not JSON, or not an object/null snapshot.
    #[error("malformed source payload: {0}")]
    Malformed(String),
}

/// Failure talking to the sink store (existence checks or insert).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink transport error: {0}")]
    Transport(String),

    #[error("sink returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("malformed sink response: {0}")]
    Malformed(String),
}

/// Either side failing, for callers that touch both stores.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// A ureq failure flattened into what the store errors need.
pub(crate) enum HttpFailure {
    Status(u16, String),
    Transport(String),
}

impl From<ureq::Error> for HttpFailure {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, response) => {
                let body = response
                    .into_string()
                    .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
                HttpFailure::Status(code, body)
            }
            ureq::Error::Transport(transport) => HttpFailure::Transport(transport.to_string()),
        }
    }
}

impl From<HttpFailure> for SourceError {
    fn from(failure: HttpFailure) -> Self {
        match failure {
            HttpFailure::Status(code, body) => SourceError::Status { code, body },
            HttpFailure::Transport(msg) => SourceError::Transport(msg),
        }
    }
}

impl From<HttpFailure> for SinkError {
    fn from(failure: HttpFailure) -> Self {
        match failure {
            HttpFailure::Status(code, body) => SinkError::Status { code, body },
            HttpFailure::Transport(msg) => SinkError::Transport(msg),
        }
    }
}
