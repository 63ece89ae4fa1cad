//! CLI command implementations.

pub mod backends;
pub mod fetch;

use anyhow::{Context, Result};
use relayfetch_fetch::FetchConfig;

use crate::Cli;

/// Loads the configuration file and applies environment overrides.
pub fn load_config(cli: &Cli) -> Result<FetchConfig> {
    let path = cli.config.clone().unwrap_or_else(FetchConfig::default_path);
    let mut config = FetchConfig::load_from(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    config
        .apply_env()
        .context("invalid RELAYFETCH_* environment override")?;
    Ok(config)
}
