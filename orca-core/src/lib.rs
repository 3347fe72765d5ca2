//! Orca core library: domain types, configuration, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes, stack identity and the shared auto-sync flag
//! - [`config`]: layered configuration (defaults, YAML file, environment)
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{OrcaConfig, RepoEntry};
pub use error::ConfigError;
pub use types::{
    center_display, AutoSync, AutoSyncFlag, Credential, RepoConfig, StackId, StackName,
};
