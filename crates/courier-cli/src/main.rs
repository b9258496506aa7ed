//! Courier CLI - relay a device's message store to a remote chat channel
//!
//! Runs sync passes against a local ledger, watches the origin store for new
//! messages, and inspects ledger health.

mod auth;
mod cli;
mod cli_config;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::cli_config::{CliConfig, ConfigSources, RuntimeConfig};
use crate::commands::config::run_config;
use crate::commands::ledger::{run_dead_letters, run_prune, run_reset, run_verify};
use crate::commands::status::run_status;
use crate::commands::sync::{run_quick, run_sync};
use crate::commands::token::run_token;
use crate::commands::watch::run_watch;
use crate::error::CliError;

const DEFAULT_LOG_DIRECTIVES: &str = "courier=info,courier_core=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVES)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Token management works before anything else is configured.
    let command = match cli.command {
        Commands::Token { command } => return run_token(command),
        command => command,
    };

    let file_config = CliConfig::load()?;
    let runtime = RuntimeConfig::resolve(
        ConfigSources::from_env(cli.db_path, cli.origin_path),
        &file_config,
    )?;
    tracing::debug!(db_path = %runtime.db_path.display(), "Resolved runtime config");

    match command {
        Commands::Sync { force, destination } => run_sync(&runtime, force, destination).await,
        Commands::Quick { destination } => run_quick(&runtime, destination).await,
        Commands::Watch { poll_ms } => run_watch(&runtime, poll_ms).await,
        Commands::Status { json } => run_status(&runtime, json).await,
        Commands::Config { command } => run_config(command, &runtime).await,
        Commands::DeadLetters { limit, json } => run_dead_letters(&runtime, limit, json).await,
        Commands::Reset { ids } => run_reset(&runtime, ids).await,
        Commands::Verify { json } => run_verify(&runtime, json).await,
        Commands::Prune {
            older_than_days,
            include_unsynced,
        } => run_prune(&runtime, older_than_days, include_unsynced).await,
        Commands::Token { command } => run_token(command),
    }
}
