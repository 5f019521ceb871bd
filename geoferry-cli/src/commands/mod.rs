pub mod check;
pub mod config;
pub mod once;
pub mod pending;
pub mod run;

use anyhow::{Context, Result};

use geoferry_core::Config;

const FIX_HINT: &str = "edit ~/.geoferry/config.yaml or set GEOFERRY_* variables";

/// Config file (defaults when absent) + `GEOFERRY_*` overrides, validated.
pub(crate) fn load_config() -> Result<Config> {
    let config = load_effective()?;
    config.validate().context(FIX_HINT)?;
    Ok(config)
}

/// Like [`load_config`], but only the source side has to be usable.
pub(crate) fn load_source_config() -> Result<Config> {
    let config = load_effective()?;
    config.validate_source().context(FIX_HINT)?;
    Ok(config)
}

fn load_effective() -> Result<Config> {
    let home = geoferry_core::config::home()?;
    let mut config =
        geoferry_core::config::load_or_default_at(&home).context("failed to load config")?;
    config.apply_env();
    Ok(config)
}
