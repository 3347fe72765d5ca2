//! Orca daemon runtime: one reconciliation task per stack, the control
//! surface, and log setup.

pub mod control;
mod error;
pub mod logging;
mod runtime;

pub use control::{router, ControlState};
pub use error::DaemonError;
pub use runtime::{run, run_stack_loop, run_with, start_blocking, REPO_COLUMN_WIDTH};
