//! `geoferry check` — connectivity probe for both stores.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use geoferry_daemon::{build_context, probe, ConnectivityReport};

/// Arguments for `geoferry check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let config = super::load_config()?;
        let result = probe(&build_context(&config));

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&ConnectivityReport::from(&result))
                    .context("failed to serialize check JSON")?
            );
        } else {
            match &result.sink {
                Ok(()) => println!("{} sink   {}", "✓".green(), config.sink.url),
                Err(err) => println!("{} sink   {}: {err}", "✗".red(), config.sink.url),
            }
            match &result.source {
                Ok(pending) => println!(
                    "{} source {} ({pending} pending)",
                    "✓".green(),
                    config.source.url
                ),
                Err(err) => println!("{} source {}: {err}", "✗".red(), config.source.url),
            }
        }

        if !result.is_ok() {
            bail!("connectivity check failed");
        }
        Ok(())
    }
}
