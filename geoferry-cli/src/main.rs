//! geoferry — move location fixes from a Firebase Realtime Database into
//! Supabase.
//!
//! # Usage
//!
//! ```text
//! geoferry run [--interval SECS] [--no-cleanup] [--dry-run]
//! geoferry once [--dry-run] [--json]
//! geoferry pending [--json]
//! geoferry check [--json]
//! geoferry config init [--force]
//! geoferry config show
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    check::CheckArgs, config::ConfigCommand, once::OnceArgs, pending::PendingArgs, run::RunArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "geoferry",
    version,
    about = "Migrate location records from Firebase RTDB into Supabase",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check both stores, then poll and migrate until halted or interrupted.
    Run(RunArgs),

    /// Check both stores and run exactly one migration cycle.
    Once(OnceArgs),

    /// List pending source records with their validation verdict (read-only).
    Pending(PendingArgs),

    /// Probe connectivity to the source and sink stores.
    Check(CheckArgs),

    /// Scaffold or print ~/.geoferry/config.yaml.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Once(args) => args.run(),
        Commands::Pending(args) => args.run(),
        Commands::Check(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
    }
}
