use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use geoferry_core::{Config, LogFormat, LoggingConfig};
use geoferry_sync::{run_cycle, CycleReport, OutcomeClass, RecordOutcome, SyncContext};

use crate::controller::{Controller, ControllerState, HaltReason};
use crate::error::{io_err, join_err, DaemonError};
use crate::startup;

/// Totals for one controller run, returned once it halts.
#[derive(Debug, Clone, Serialize)]
pub struct LoopSummary {
    pub cycles: u64,
    pub migrated: usize,
    pub fetch_failures: u64,
    pub halt: HaltReason,
}

/// Check both stores, then run the controller on a current-thread runtime
/// until it halts or Ctrl-C arrives.
///
/// An unrunnable config fails with [`DaemonError::Config`] before any
/// request is made.
pub fn start_blocking(config: &Config) -> Result<LoopSummary, DaemonError> {
    config.validate()?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio runtime", e))?;

    let ctx = startup::build_context(config);
    let controller = Controller::from_settings(&config.sync);

    runtime.block_on(async move {
        let ctx = tokio::task::spawn_blocking(move || {
            startup::check_connectivity(&ctx).map(|_| ctx)
        })
        .await
        .map_err(|e| join_err("startup check", e))??;

        let (shutdown_tx, _) = broadcast::channel::<()>(4);
        let signal_handle = spawn_ctrl_c(shutdown_tx.clone());
        let summary = run(ctx, controller, shutdown_tx).await;
        signal_handle.abort();
        summary
    })
}

/// Drive cycles until `controller` halts.
///
/// The shutdown channel is checked before every cycle and raced against
/// every sleep; a cycle already running on the blocking pool is never cut
/// short.
pub async fn run(
    mut ctx: SyncContext,
    mut controller: Controller,
    shutdown: broadcast::Sender<()>,
) -> Result<LoopSummary, DaemonError> {
    let mut shutdown_rx = shutdown.subscribe();
    let mut cycles = 0u64;
    let mut migrated = 0usize;
    let mut fetch_failures = 0u64;

    tracing::info!(
        interval_ms = controller.next_sleep().unwrap_or_default().as_millis() as u64,
        options = ?ctx.options(),
        "controller started"
    );

    loop {
        if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
            controller.interrupt();
        }
        if controller.is_halted() {
            break;
        }

        let (returned, result) = tokio::task::spawn_blocking(move || {
            let result = run_cycle(&mut ctx);
            (ctx, result)
        })
        .await
        .map_err(|e| join_err("sync cycle", e))?;
        ctx = returned;
        cycles += 1;

        match result {
            Ok(report) => {
                log_report(&report);
                migrated += report.migrated();
                controller.on_cycle_success();
            }
            Err(err) => {
                fetch_failures += 1;
                if controller.on_fetch_failure() == ControllerState::Backoff {
                    tracing::warn!(
                        error = %err,
                        consecutive_failures = controller.consecutive_failures(),
                        "source fetch failed; backing off"
                    );
                } else {
                    tracing::warn!(error = %err, "source fetch failed");
                }
            }
        }

        let Some(pause) = controller.next_sleep() else {
            break;
        };
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = shutdown_rx.recv() => controller.interrupt(),
        }
    }

    let halt = controller.halt_reason().unwrap_or(HaltReason::Interrupted);
    match halt {
        HaltReason::FailureThreshold { failures } => tracing::error!(
            failures,
            cycles,
            migrated,
            "source unreachable for {failures} consecutive cycles; halting, restart required"
        ),
        HaltReason::Interrupted => tracing::info!(cycles, migrated, "controller stopped"),
    }

    Ok(LoopSummary {
        cycles,
        migrated,
        fetch_failures,
        halt,
    })
}

/// One structured line per record outcome, plus a summary when anything
/// was migrated.
pub fn log_report(report: &CycleReport) {
    for outcome in &report.outcomes {
        log_outcome(outcome);
    }

    if report.migrated() > 0 || report.would_migrate() > 0 {
        tracing::info!(
            fetched = report.fetched,
            processed = report.processed(),
            migrated = report.migrated(),
            would_migrate = report.would_migrate(),
            skipped = report.skipped(),
            rejected = report.rejected(),
            failed = report.errors(),
            removed = report.removed(),
            remove_failed = report.remove_failed(),
            duration_ms = report.duration_ms as u64,
            "cycle complete"
        );
    }
}

fn log_outcome(outcome: &RecordOutcome) {
    let key = outcome.key().as_str();
    let tag = outcome.tag();
    let reason = outcome.reason();
    let device_id = outcome.device_id().map(|d| d.as_str()).unwrap_or_default();

    match outcome.class() {
        OutcomeClass::Migrated => {
            tracing::info!(key, outcome = tag, reason = %reason, device_id, "record outcome")
        }
        OutcomeClass::SkipSuppression => {
            tracing::debug!(key, outcome = tag, reason = %reason, device_id, "record outcome")
        }
        OutcomeClass::ValidationRejection | OutcomeClass::TransientSinkFailure => {
            tracing::warn!(key, outcome = tag, reason = %reason, device_id, "record outcome")
        }
    }
}

fn spawn_ctrl_c(shutdown: broadcast::Sender<()>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received ctrl-c, stopping after the current cycle");
                let _ = shutdown.send(());
            }
            Err(err) => tracing::warn!(error = %err, "ctrl-c handler failed"),
        }
    })
}

/// Install the global subscriber on stderr. `RUST_LOG` wins over
/// `config.filter`; a second call is a no-op.
pub fn init_tracing(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
