use courier_core::util::unix_millis_now;

use crate::cli_config::RuntimeConfig;
use crate::commands::common::{format_dead_letter_lines, format_mismatch_line, open_database};
use crate::error::CliError;

const MILLIS_PER_DAY: i64 = 86_400_000;

pub async fn run_dead_letters(
    runtime: &RuntimeConfig,
    limit: usize,
    json: bool,
) -> Result<(), CliError> {
    let db = open_database(&runtime.db_path)?;
    let messages = db
        .list_dead_letters(runtime.engine.max_attempts, limit)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!("No dead-lettered messages.");
        return Ok(());
    }

    for line in format_dead_letter_lines(&messages) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_reset(runtime: &RuntimeConfig, ids: Vec<String>) -> Result<(), CliError> {
    let db = open_database(&runtime.db_path)?;
    let ids = if ids.is_empty() { None } else { Some(ids) };
    let reset = db.reset_attempts(ids.as_deref()).await?;
    println!("Re-armed {reset} message(s)");
    Ok(())
}

pub async fn run_verify(runtime: &RuntimeConfig, json: bool) -> Result<(), CliError> {
    let db = open_database(&runtime.db_path)?;
    let mismatches = db.find_mirror_mismatches().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&mismatches)?);
    } else if mismatches.is_empty() {
        println!("Ledger and mirror agree.");
    } else {
        for mismatch in &mismatches {
            println!("{}", format_mismatch_line(mismatch));
        }
    }

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(CliError::MirrorMismatch(mismatches.len()))
    }
}

pub async fn run_prune(
    runtime: &RuntimeConfig,
    older_than_days: u32,
    include_unsynced: bool,
) -> Result<(), CliError> {
    let db = open_database(&runtime.db_path)?;
    let cutoff = prune_cutoff(unix_millis_now(), older_than_days);
    let deleted = db.delete_before(cutoff, !include_unsynced).await?;
    println!("Deleted {deleted} message(s)");
    Ok(())
}

pub fn prune_cutoff(now: i64, older_than_days: u32) -> i64 {
    now.saturating_sub(i64::from(older_than_days).saturating_mul(MILLIS_PER_DAY))
}
