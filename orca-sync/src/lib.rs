//! # orca-sync
//!
//! The per-stack reconciliation core.
//!
//! - [`fetch`]: one request/response exchange for the remote definition,
//!   with the authentication strategy picked from the URL shape.
//! - [`store`]: byte-exact drift detection and atomic materialization of the
//!   deployed copy.
//! - [`stack`]: the [`Stack`] entity and its [`Stack::cycle`]:
//!   fetch → collect → plan → materialize → (apply) → status.

pub mod error;
pub mod fetch;
pub mod stack;
pub mod store;

pub use error::{FetchError, SyncError};
pub use fetch::{destination_file_name, AuthStrategy, Fetcher};
pub use stack::{CycleStatus, Stack};
pub use store::{compose_definition, ArtifactStore, FetchedFile, MaterializeReport, WriteResult};
