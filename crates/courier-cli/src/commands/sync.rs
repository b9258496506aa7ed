use courier_core::sync::{PassOptions, PassOutcome, SyncResult};

use crate::cli_config::RuntimeConfig;
use crate::commands::common::build_engine;
use crate::error::CliError;

pub async fn run_sync(
    runtime: &RuntimeConfig,
    force: bool,
    destination: Option<String>,
) -> Result<(), CliError> {
    let (engine, _source) = build_engine(runtime)?;
    let report = engine
        .run_full_sync(PassOptions {
            destination,
            force,
            ..PassOptions::default()
        })
        .await?;

    println!("Sync {report}");
    if matches!(report.outcome, PassOutcome::Aborted(_)) {
        let message = report
            .error_message
            .clone()
            .unwrap_or_else(|| report.to_string());
        return Err(CliError::Sync(message));
    }
    Ok(())
}

pub async fn run_quick(runtime: &RuntimeConfig, destination: Option<String>) -> Result<(), CliError> {
    let (engine, _source) = build_engine(runtime)?;
    let result = engine
        .run_quick_sync(PassOptions {
            destination,
            ..PassOptions::default()
        })
        .await;

    match result {
        SyncResult::Success(sent) => {
            println!("Quick sync sent {sent} message(s)");
            Ok(())
        }
        SyncResult::NoDestination => Err(CliError::Sync(
            "No destination configured. Run `courier config destination <id>`.".to_string(),
        )),
        SyncResult::Error(message) => Err(CliError::Sync(message)),
    }
}
