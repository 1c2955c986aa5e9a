//! Ferry — push configured local files to remote hosts over SFTP.
//!
//! # Usage
//!
//! ```text
//! ferry run [--config <path>] [--dry-run] [--json]
//! ferry check [--config <path>]
//! ferry history <user@host> [--config <path>] [--limit N] [--json]
//! ferry rotate [--config <path>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{check::CheckArgs, history::HistoryArgs, rotate::RotateArgs, run::RunArgs};

#[derive(Parser, Debug)]
#[command(
    name = "ferry",
    version,
    about = "Distribute local files to remote hosts, skipping unchanged and still-growing files",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Plan and execute one full sync invocation.
    Run(RunArgs),

    /// Validate the config file and list its rules.
    Check(CheckArgs),

    /// Show recent successful transfers for a destination.
    History(HistoryArgs),

    /// Force a rotation pass over history and error stores.
    Rotate(RotateArgs),
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Check(args) => args.run(),
        Commands::History(args) => args.run(),
        Commands::Rotate(args) => args.run(),
    }
}
