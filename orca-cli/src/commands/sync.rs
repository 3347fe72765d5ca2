//! `orca sync on|off`: toggle auto-sync on a running daemon.

use std::fmt;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Args, ValueEnum};

use super::control::{agent, send, ControlArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    On,
    Off,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::On => "on",
            Mode::Off => "off",
        })
    }
}

/// Arguments for `orca sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// New auto-sync mode.
    #[arg(value_enum)]
    pub mode: Mode,

    #[command(flatten)]
    pub control: ControlArgs,

    /// User from the daemon's `basicauth` map.
    #[arg(long, env = "ORCA_CONTROL_USER")]
    pub user: String,

    /// Password for `--user`.
    #[arg(long, env = "ORCA_CONTROL_PASSWORD", hide_env_values = true)]
    pub password: String,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let url = self.control.endpoint(&format!("sync/{}", self.mode));
        let credentials = BASE64.encode(format!("{}:{}", self.user, self.password));
        let body = send(
            agent()
                .post(&url)
                .set("Authorization", &format!("Basic {credentials}")),
        )
        .with_context(|| format!("failed to turn auto-sync {}", self.mode))?;
        println!("auto-sync {}: {}", self.mode, body.trim());
        Ok(())
    }
}
