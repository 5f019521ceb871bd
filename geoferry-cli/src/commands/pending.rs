//! `geoferry pending` — what the next cycle would see.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use geoferry_sync::{preview, FirebaseSource, PendingEntry};

/// Arguments for `geoferry pending`.
#[derive(Args, Debug)]
pub struct PendingArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct PendingJson<'a> {
    pending: usize,
    valid: usize,
    rejected: usize,
    entries: &'a [PendingEntry],
}

#[derive(Tabled)]
struct PendingRow {
    #[tabled(rename = "key")]
    key: String,
    #[tabled(rename = "device")]
    device: String,
    #[tabled(rename = "timestamp")]
    timestamp: String,
    #[tabled(rename = "verdict")]
    verdict: String,
}

impl PendingArgs {
    pub fn run(self) -> Result<()> {
        let config = super::load_source_config()?;
        let source = FirebaseSource::new(&config.source, config.sync.request_timeout());
        let entries = preview(&source).context("failed to fetch pending records")?;
        let rejected = entries.iter().filter(|e| e.rejection.is_some()).count();

        if self.json {
            let payload = PendingJson {
                pending: entries.len(),
                valid: entries.len() - rejected,
                rejected,
                entries: &entries,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize pending JSON")?
            );
            return Ok(());
        }

        print_table(&entries, rejected);
        Ok(())
    }
}

fn print_table(entries: &[PendingEntry], rejected: usize) {
    println!(
        "{} pending | {} valid | {} rejected",
        entries.len(),
        entries.len() - rejected,
        rejected
    );
    if entries.is_empty() {
        println!("Source is empty.");
        return;
    }

    let rows: Vec<PendingRow> = entries
        .iter()
        .map(|entry| PendingRow {
            key: entry.key.to_string(),
            device: entry
                .device_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string()),
            timestamp: entry.timestamp.clone().unwrap_or_else(|| "-".to_string()),
            verdict: match &entry.rejection {
                None => "candidate".green().to_string(),
                Some(reason) => reason.to_string().red().to_string(),
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if rejected > 0 {
        println!("Rejected records stay in the source until fixed or removed by hand.");
    }
}
