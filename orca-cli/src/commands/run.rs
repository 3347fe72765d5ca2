//! `orca run`: the reconciliation daemon in the foreground.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use orca_core::OrcaConfig;

/// Arguments for `orca run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override the configured poll interval, in seconds.
    #[arg(long)]
    pub interval: Option<u64>,
}

impl RunArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let mut config = OrcaConfig::load(config_path).context("failed to load configuration")?;
        if let Some(interval) = self.interval {
            config.interval = interval;
        }
        orca_daemon::start_blocking(config).context("daemon exited with error")
    }
}
