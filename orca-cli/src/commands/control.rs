//! Shared HTTP client plumbing for commands that talk to a running daemon.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;

pub const DEFAULT_ADDR: &str = "http://127.0.0.1:6666";

/// Where the daemon's control surface listens.
#[derive(Args, Debug, Clone)]
pub struct ControlArgs {
    /// Base URL of the control surface.
    #[arg(long, env = "ORCA_CONTROL_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,
}

impl ControlArgs {
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.addr.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

pub fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(10))
        .build()
}

/// Send `request` and return the response body.
pub fn send(request: ureq::Request) -> Result<String> {
    match request.call() {
        Ok(response) => response
            .into_string()
            .context("failed to read control surface response"),
        Err(ureq::Error::Status(401, _)) => {
            bail!("unauthorized: check --user and --password against the daemon's basicauth")
        }
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            bail!("control surface answered {code}: {}", body.trim())
        }
        Err(ureq::Error::Transport(transport)) => Err(anyhow::Error::new(transport)
            .context("could not reach the control surface; is `orca run` active?")),
    }
}
