//! `geoferry once` — a single migration cycle.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use geoferry_daemon::{build_context, check_connectivity, init_tracing, log_report};
use geoferry_sync::{run_cycle, CycleReport, RecordOutcome, Removal};

/// Arguments for `geoferry once`.
#[derive(Args, Debug)]
pub struct OnceArgs {
    /// Evaluate every record but write and delete nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the cycle report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl OnceArgs {
    pub fn run(self) -> Result<()> {
        let mut config = super::load_config()?;
        if self.dry_run {
            config.sync.dry_run = true;
        }
        init_tracing(&config.logging);

        let mut ctx = build_context(&config);
        check_connectivity(&ctx).context("startup check failed")?;
        let report = run_cycle(&mut ctx).context("source fetch failed")?;
        log_report(&report);

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize cycle report")?
            );
        } else {
            print_report(&report, config.sync.dry_run);
        }
        Ok(())
    }
}

fn print_report(report: &CycleReport, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    if report.processed() == 0 {
        println!("{prefix}✓ nothing to migrate ({} fetched)", report.fetched);
        return;
    }

    println!(
        "{prefix}✓ cycle finished in {} ms ({} fetched, {} migrated, {} skipped, {} rejected, {} failed)",
        report.duration_ms,
        report.fetched,
        report.migrated() + report.would_migrate(),
        report.skipped(),
        report.rejected(),
        report.errors(),
    );

    for outcome in &report.outcomes {
        let device = outcome
            .device_id()
            .map(|d| d.as_str())
            .unwrap_or("-");
        let line = format!("{}  {device}", outcome.key());
        match outcome {
            RecordOutcome::Migrated { removal, .. } => {
                let note = match removal {
                    Removal::Removed => "",
                    Removal::Disabled => " (kept in source)",
                    Removal::Failed(_) => " (source delete failed)",
                };
                println!("  {}  {line}{note}", "✎".green());
            }
            RecordOutcome::WouldMigrate { .. } => println!("  {}  {line}", "~".cyan()),
            RecordOutcome::Skipped { reason, .. } => {
                println!("  {}  {line}  {}", "·".bright_black(), reason)
            }
            RecordOutcome::Rejected { reason, .. } => {
                println!("  {}  {line}  {}", "✗".red(), reason)
            }
            RecordOutcome::Error { error, .. } => {
                println!("  {}  {line}  {}", "!".yellow(), error)
            }
        }
    }
}
