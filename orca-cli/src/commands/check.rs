//! `orca check`: load configuration the way `orca run` would and show the
//! stacks it would reconcile.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use orca_core::{OrcaConfig, StackId};
use orca_daemon::logging::mask_secrets;

/// Arguments for `orca check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct StackRow {
    #[tabled(rename = "stack")]
    name: String,
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "url")]
    url: String,
    #[tabled(rename = "auth")]
    auth: &'static str,
    #[tabled(rename = "workdir")]
    workdir: String,
    #[tabled(rename = "target")]
    target: String,
}

#[derive(Serialize)]
struct CheckReport {
    listen: String,
    autosync: String,
    interval_secs: u64,
    stacks: Vec<StackRow>,
}

impl CheckArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let config = OrcaConfig::load(config_path).context("configuration is invalid")?;
        let report = build_report(&config);

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to encode report")?
            );
            return Ok(());
        }

        println!(
            "{} configuration ok: {} stack(s), autosync {}, every {}s, control on {}",
            "✓".green(),
            report.stacks.len(),
            report.autosync.bold(),
            report.interval_secs,
            report.listen
        );
        let mut table = Table::new(report.stacks);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn build_report(config: &OrcaConfig) -> CheckReport {
    let stacks = config
        .repo_configs()
        .into_iter()
        .map(|repo| {
            let id = StackId::from_url(&repo.url);
            let auth = match (repo.credential.basic(), repo.credential.secret()) {
                (Some(_), _) => "user+secret",
                (None, Some(_)) => "secret",
                (None, None) => "none",
            };
            StackRow {
                workdir: config.stack_workdir(&id).display().to_string(),
                target: config.stack_target(&repo.name).display().to_string(),
                name: repo.name.to_string(),
                id: id.to_string(),
                url: mask_secrets(&repo.url).into_owned(),
                auth,
            }
        })
        .collect();

    CheckReport {
        listen: config.listen.clone(),
        autosync: config.autosync.to_string(),
        interval_secs: config.interval,
        stacks,
    }
}
