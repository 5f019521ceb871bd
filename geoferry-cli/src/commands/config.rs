//! `geoferry config init|show`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use geoferry_core::config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a default ~/.geoferry/config.yaml.
    Init(ConfigInitArgs),
    /// Print the effective config (file + environment) with secrets masked.
    Show,
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Overwrite an existing file with defaults.
    #[arg(long)]
    pub force: bool,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    let home = config::home()?;
    let path = config::config_path_at(&home);

    match command {
        ConfigCommand::Init(args) => {
            let existed = path.exists();
            config::init_at(&home, args.force)
                .with_context(|| format!("failed to initialize {}", path.display()))?;
            if existed && !args.force {
                println!(
                    "config already exists at {} (use --force to overwrite)",
                    path.display()
                );
            } else {
                println!("✓ wrote {}", path.display());
                println!("  Fill in source.url, sink.url and sink.api_key before `geoferry run`.");
            }
        }
        ConfigCommand::Show => {
            let mut loaded = config::load_at(&home)?;
            loaded.apply_env();
            let yaml = serde_yaml::to_string(&loaded.redacted())
                .context("failed to render config YAML")?;
            print!("{yaml}");
        }
    }
    Ok(())
}
