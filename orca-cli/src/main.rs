//! Orca: GitOps reconciliation agent for compose stacks.
//!
//! # Usage
//!
//! ```text
//! orca [--config <file>] run
//! orca [--config <file>] check [--json]
//! orca sync on|off [--addr <url>] --user <user> --password <password>
//! orca health [--addr <url>]
//! orca id <url>
//! orca validate <file> [--name <project>]
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    check::CheckArgs, health::HealthArgs, id::IdArgs, run::RunArgs, sync::SyncArgs,
    validate::ValidateArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "orca",
    version,
    about = "Keep running compose stacks in sync with their remote definitions",
    long_about = None,
)]
struct Cli {
    /// Configuration file (default: ./config.yml, then the user config dir).
    #[arg(long, global = true, env = "ORCA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reconciliation daemon in the foreground.
    Run(RunArgs),

    /// Load and validate configuration, then list the stacks.
    Check(CheckArgs),

    /// Turn auto-sync on or off on a running daemon.
    Sync(SyncArgs),

    /// Query a running daemon's health endpoint.
    Health(HealthArgs),

    /// Print the stack identifier derived from a repository URL.
    Id(IdArgs),

    /// Parse a compose file the way the daemon would.
    Validate(ValidateArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(cli.config.as_deref()),
        Commands::Check(args) => args.run(cli.config.as_deref()),
        Commands::Sync(args) => args.run(),
        Commands::Health(args) => args.run(),
        Commands::Id(args) => args.run(),
        Commands::Validate(args) => args.run(),
    }
}
