//! Orchestration adapter.
//!
//! The reconciliation core only knows [`Orchestrator::apply`]; any engine that
//! converges running containers to a [`ComposeProject`] is substitutable.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::{io_err, ApplyError};
use crate::project::ComposeProject;

/// Options passed with every apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Remove resources that are no longer declared in the project.
    pub remove_orphans: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            remove_orphans: true,
        }
    }
}

/// Converge the engine to `project`.
pub trait Orchestrator: Send + Sync {
    fn apply(&self, project: &ComposeProject, options: &ApplyOptions) -> Result<(), ApplyError>;
}

/// Drives `docker compose up` with the labeled definition on stdin.
///
/// The project directory (`targetpath/<stack>`) is the working directory, so
/// relative paths in the definition resolve against the deployed copy.
#[derive(Debug, Clone)]
pub struct DockerCompose {
    command: Vec<String>,
}

impl Default for DockerCompose {
    fn default() -> Self {
        Self::new(vec!["docker".to_string(), "compose".to_string()])
    }
}

impl DockerCompose {
    /// `command` is the program followed by its leading arguments,
    /// e.g. `["docker", "compose"]` or `["docker-compose"]`.
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    fn args_for(project: &ComposeProject, options: &ApplyOptions) -> Vec<String> {
        let mut args = vec![
            "--project-name".to_string(),
            project.name.clone(),
            "--project-directory".to_string(),
            project.working_dir.display().to_string(),
            "--file".to_string(),
            "-".to_string(),
            "up".to_string(),
            "--detach".to_string(),
        ];
        if options.remove_orphans {
            args.push("--remove-orphans".to_string());
        }
        args
    }
}

impl Orchestrator for DockerCompose {
    fn apply(&self, project: &ComposeProject, options: &ApplyOptions) -> Result<(), ApplyError> {
        let Some((program, leading)) = self.command.split_first() else {
            return Err(ApplyError::Spawn {
                program: String::new(),
                source: std::io::Error::other("empty orchestrator command"),
            });
        };

        let definition = project.to_yaml()?;
        std::fs::create_dir_all(&project.working_dir)
            .map_err(|e| io_err(&project.working_dir, e))?;

        let args = Self::args_for(project, options);
        tracing::debug!(
            target: "compose",
            project = %project.name,
            program = %program,
            args = ?args,
            "invoking orchestrator",
        );

        let mut child = Command::new(program)
            .args(leading)
            .args(&args)
            .current_dir(&project.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ApplyError::Spawn {
                program: program.clone(),
                source: e,
            })?;

        // The pipe closes when `stdin` drops; the child is always reaped,
        // even when it stopped reading early.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(definition.as_bytes()),
            None => Ok(()),
        };

        let output = child.wait_with_output().map_err(|e| io_err(program, e))?;
        if !output.status.success() {
            return Err(ApplyError::Rejected {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written.map_err(|e| io_err(program, e))?;

        tracing::info!(
            target: "compose",
            project = %project.name,
            services = project.services.len(),
            "project applied",
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;

    use crate::project::load;

    #[test]
    fn args_include_remove_orphans_by_default() {
        let project = load(
            Path::new("/srv/compose/web"),
            b"services:\n  web:\n    image: nginx\n",
            "web",
        )
        .unwrap();
        let args = DockerCompose::args_for(&project, &ApplyOptions::default());
        assert!(args.contains(&"--remove-orphans".to_string()));
        assert_eq!(&args[..2], &["--project-name".to_string(), "web".to_string()]);
    }

    #[test]
    fn args_omit_remove_orphans_when_disabled() {
        let project = load(
            Path::new("/srv/compose/web"),
            b"services:\n  web:\n    image: nginx\n",
            "web",
        )
        .unwrap();
        let args = DockerCompose::args_for(
            &project,
            &ApplyOptions {
                remove_orphans: false,
            },
        );
        assert!(!args.contains(&"--remove-orphans".to_string()));
    }
}
