//! Error types for orca-compose.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors from turning definition bytes into a [`crate::ComposeProject`].
#[derive(Debug, Error)]
pub enum LoadError {
    /// The bytes are not valid YAML. Carries line/column context.
    #[error("compose syntax error: {0}")]
    Syntax(#[from] serde_yaml::Error),

    /// Valid YAML, but not a usable compose definition.
    #[error("invalid compose definition: {0}")]
    Invalid(String),

    /// Nothing to parse (no definition fetched yet, or an empty file).
    #[error("compose definition is empty")]
    Empty,

    /// Filesystem failure while preparing the project directory.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    /// `true` for errors caused by the definition content itself.
    pub fn is_definition_error(&self) -> bool {
        !matches!(self, LoadError::Io { .. })
    }
}

/// Errors from handing a project to the orchestration engine.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The engine binary could not be started.
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine ran and refused the plan.
    #[error("orchestrator exited with {status}: {stderr}")]
    Rejected { status: ExitStatus, stderr: String },

    /// The plan could not be serialized for the engine.
    #[error("failed to encode project: {0}")]
    Encode(#[from] serde_yaml::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ApplyError {
    ApplyError::Io {
        path: path.into(),
        source,
    }
}
