//! # orca-compose
//!
//! Boundary to the container orchestration engine.
//!
//! - [`project::load`] parses a compose definition into a [`ComposeProject`]
//!   and decorates every service with the Orca/compose label set.
//! - [`Orchestrator`] is the apply capability; [`DockerCompose`] drives the
//!   `docker compose` CLI.
//!
//! ```rust,no_run
//! use std::path::Path;
//! use orca_compose::{load, ApplyOptions, DockerCompose, Orchestrator};
//!
//! let bytes = b"services:\n  web:\n    image: nginx\n";
//! if let Ok(project) = load(Path::new("/srv/compose/web"), bytes, "web") {
//!     let engine = DockerCompose::default();
//!     let _ = engine.apply(&project, &ApplyOptions::default());
//! }
//! ```

pub mod error;
pub mod orchestrator;
pub mod project;

pub use error::{ApplyError, LoadError};
pub use orchestrator::{ApplyOptions, DockerCompose, Orchestrator};
pub use project::{
    decorate_labels, load, load_file, ComposeProject, Service, COMPOSE_FILE_NAMES,
    DEFAULT_COMPOSE_FILE,
};
