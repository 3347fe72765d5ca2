//! `orca id`: stack identifier for a repository URL.

use anyhow::Result;
use clap::Args;

use orca_core::StackId;

/// Arguments for `orca id`.
#[derive(Args, Debug)]
pub struct IdArgs {
    /// Repository URL as written under `repos:`.
    pub url: String,
}

impl IdArgs {
    pub fn run(self) -> Result<()> {
        println!("{}", StackId::from_url(&self.url));
        Ok(())
    }
}
