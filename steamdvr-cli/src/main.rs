//! SteamDVR CLI - Export Steam game recordings to MP4
//!
//! Provides command-line access to encoder probing, clip discovery, and
//! the concurrent export pipeline.

mod commands;

use clap::Parser;
use steamdvr_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "steamdvr")]
#[command(about = "Export Steam game recordings to standard MP4 files")]
struct Cli {
    /// Console log verbosity
    #[arg(long, default_value = "warn", global = true)]
    log_level: CliLogLevel,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_level.as_tracing_level(), None) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    match commands::handle_command(cli.command).await {
        Ok(exit) => std::process::exit(exit.code()),
        Err(e) => {
            eprintln!("Error: {}", e.user_message());
            tracing::debug!("Command failed: {e:?}");
            std::process::exit(1);
        }
    }
}
