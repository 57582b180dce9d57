//! ModVault CLI - Command-line interface
//!
//! Runs the download gateway and offers offline checks of its data files.

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use modvault_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "modvault")]
#[command(about = "Entitlement-gated download gateway")]
struct Cli {
    /// Console log level (overridden by RUST_LOG)
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    /// Directory for the full trace of the last run
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())
        .context("Failed to initialize tracing")?;

    commands::handle_command(cli.command).await
}
