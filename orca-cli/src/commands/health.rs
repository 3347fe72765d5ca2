//! `orca health`: ping a running daemon.

use anyhow::{Context, Result};
use clap::Args;

use super::control::{agent, send, ControlArgs};

/// Arguments for `orca health`.
#[derive(Args, Debug)]
pub struct HealthArgs {
    #[command(flatten)]
    pub control: ControlArgs,
}

impl HealthArgs {
    pub fn run(self) -> Result<()> {
        let url = self.control.endpoint("health");
        let body = send(agent().get(&url)).context("health check failed")?;
        println!("{}", body.trim());
        Ok(())
    }
}
