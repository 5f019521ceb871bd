//! geoferry daemon: startup checks and the polling controller loop.

pub mod controller;
mod error;
mod runtime;
pub mod startup;

pub use controller::{Controller, ControllerState, HaltReason};
pub use error::DaemonError;
pub use runtime::{init_tracing, log_report, run, start_blocking, LoopSummary};
pub use startup::{build_context, check_connectivity, probe, Connectivity, ConnectivityReport};
