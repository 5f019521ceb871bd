//! `geoferry run` — the long-running migration loop.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use geoferry_daemon::{init_tracing, start_blocking, HaltReason};

/// Arguments for `geoferry run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Seconds between cycles; overrides `sync.poll_interval_secs`.
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Keep migrated records in the source instead of deleting them.
    #[arg(long)]
    pub no_cleanup: bool,

    /// Evaluate every record but write and delete nothing.
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let mut config = super::load_config()?;
        if let Some(secs) = self.interval {
            config.sync.poll_interval_secs = secs;
        }
        if self.no_cleanup {
            config.sync.cleanup = false;
        }
        if self.dry_run {
            config.sync.dry_run = true;
        }
        config.validate().context("invalid command-line override")?;

        init_tracing(&config.logging);
        let summary = start_blocking(&config).context("migration loop did not start")?;

        match summary.halt {
            HaltReason::FailureThreshold { failures } => println!(
                "{} halted after {failures} consecutive source failures ({} cycles, {} migrated); restart once the source is reachable",
                "✗".red(),
                summary.cycles,
                summary.migrated,
            ),
            HaltReason::Interrupted => println!(
                "{} stopped after {} cycles, {} migrated",
                "✓".green(),
                summary.cycles,
                summary.migrated,
            ),
        }
        Ok(())
    }
}
