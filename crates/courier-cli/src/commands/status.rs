use crate::cli_config::RuntimeConfig;
use crate::commands::common::{format_status_lines, open_database, StatusReport};
use crate::error::CliError;

pub async fn run_status(runtime: &RuntimeConfig, json: bool) -> Result<(), CliError> {
    let report = load_status(runtime).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in format_status_lines(&report) {
        println!("{line}");
    }
    Ok(())
}

pub async fn load_status(runtime: &RuntimeConfig) -> Result<StatusReport, CliError> {
    let db = open_database(&runtime.db_path)?;
    let settings = db.load_settings().await?;
    let stats = db.stats(runtime.engine.max_attempts).await?;

    Ok(StatusReport {
        db_path: runtime.db_path.display().to_string(),
        settings,
        stats,
    })
}
