//! geoferry core library — record types, normalization, configuration.
//!
//! - [`types`] — newtypes, raw/canonical records, rejection reasons
//! - [`normalize`] — raw source record → [`CanonicalRecord`]
//! - [`config`] — `~/.geoferry/config.yaml` load / save / init
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod normalize;
pub mod types;

pub use config::{Config, LogFormat, LoggingConfig, SinkConfig, SourceConfig, SyncSettings};
pub use error::ConfigError;
pub use normalize::{normalize, normalize_entry};
pub use types::{CanonicalRecord, DeviceId, RawRecord, RejectionReason, SourceKey};
