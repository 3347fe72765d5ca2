//! `orca validate`: parse and label a local compose file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use orca_compose::load_file;

/// Arguments for `orca validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Compose file to check.
    pub file: PathBuf,

    /// Project name (default: the file's parent directory name).
    #[arg(long)]
    pub name: Option<String>,

    /// Print the labeled definition that would be handed to the engine.
    #[arg(long)]
    pub print: bool,
}

impl ValidateArgs {
    pub fn run(self) -> Result<()> {
        let working_dir = self
            .file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let name = match &self.name {
            Some(name) => name.clone(),
            None => default_project_name(working_dir)?,
        };

        let project = load_file(working_dir, &self.file, &name).with_context(|| {
            format!(
                "{} is not a usable compose definition",
                self.file.display()
            )
        })?;

        if self.print {
            print!("{}", project.to_yaml().context("failed to encode definition")?);
            return Ok(());
        }

        println!(
            "{} {}: project '{}' with {} service(s): {}",
            "✓".green(),
            self.file.display(),
            project.name,
            project.services.len(),
            project.service_names().join(", ")
        );
        Ok(())
    }
}

fn default_project_name(working_dir: &Path) -> Result<String> {
    let absolute = std::fs::canonicalize(working_dir)
        .with_context(|| format!("cannot resolve {}", working_dir.display()))?;
    absolute
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .context("cannot derive a project name; pass --name")
}
