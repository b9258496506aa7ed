use std::io::{self, IsTerminal, Read};
use std::path::Path;
use std::sync::Arc;

use courier_core::channel::HttpChannelClient;
use courier_core::models::{LedgerStats, LocalMessage, MirrorMismatch, SyncSettings};
use courier_core::services::DatabaseService;
use courier_core::source::{MessageSource, SqliteOriginProvider};
use courier_core::sync::{SyncOrchestrator, SystemClock};
use serde::Serialize;

use crate::auth::{require_token, TokenStore};
use crate::cli_config::RuntimeConfig;
use crate::error::CliError;

pub type Engine = SyncOrchestrator<HttpChannelClient, SqliteOriginProvider>;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub db_path: String,
    pub settings: SyncSettings,
    pub stats: LedgerStats,
}

pub fn open_database(db_path: &Path) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(db_path)?)
}

pub fn open_source(
    runtime: &RuntimeConfig,
) -> Result<Arc<MessageSource<SqliteOriginProvider>>, CliError> {
    let provider = SqliteOriginProvider::open(runtime.require_origin_path()?)?;
    Ok(Arc::new(
        MessageSource::new(provider).with_scan_cap(runtime.engine.initial_scan_cap),
    ))
}

/// Wire the ledger, origin, and channel client into an orchestrator.
pub fn build_engine(
    runtime: &RuntimeConfig,
) -> Result<(Engine, Arc<MessageSource<SqliteOriginProvider>>), CliError> {
    let db = open_database(&runtime.db_path)?;
    let source = open_source(runtime)?;
    let token = require_token(&TokenStore::new())?;
    let client = HttpChannelClient::new(&runtime.api_base_url, token)?;

    let engine = SyncOrchestrator::new(
        db,
        Arc::clone(&source),
        client,
        Arc::new(SystemClock),
        runtime.engine.clone(),
    );
    Ok((engine, source))
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_optional_timestamp(timestamp_ms: Option<i64>) -> String {
    timestamp_ms.map_or_else(|| "never".to_string(), format_timestamp)
}

pub fn message_preview(message: &LocalMessage, max_chars: usize) -> String {
    let single_line = message.body.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let keep = max_chars.saturating_sub(3);
    format!("{}...", single_line.chars().take(keep).collect::<String>())
}

pub fn format_dead_letter_lines(messages: &[LocalMessage]) -> Vec<String> {
    messages
        .iter()
        .map(|message| {
            format!(
                "{}  {}  {:<14}  attempts={}  error={}  {}",
                message.id,
                format_timestamp(message.timestamp),
                message.address,
                message.sync_attempts,
                message.last_sync_error.as_deref().unwrap_or("-"),
                message_preview(message, 40)
            )
        })
        .collect()
}

pub fn format_mismatch_line(mismatch: &MirrorMismatch) -> String {
    match mismatch {
        MirrorMismatch::MissingMirror {
            local_id,
            remote_id,
        } => format!(
            "missing mirror: message={} remote={}",
            local_id,
            remote_id.as_deref().unwrap_or("-")
        ),
        MirrorMismatch::OrphanMirror {
            remote_id,
            origin_local_id,
        } => format!("orphan mirror: remote={remote_id} message={origin_local_id}"),
    }
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let settings = &report.settings;
    let mut lines = vec![
        format!("Ledger:           {}", report.db_path),
        format!(
            "Sync:             {}",
            if settings.sync_enabled {
                "enabled"
            } else {
                "disabled"
            }
        ),
        format!("Mode:             {}", settings.sync_mode),
    ];
    if let Some(since) = settings.sync_enabled_since {
        lines.push(format!("New-only since:   {}", format_timestamp(since)));
    }
    lines.push(format!(
        "Destination:      {}",
        settings.destination_id.as_deref().unwrap_or("(not set)")
    ));
    lines.push(format!(
        "Last full sync:   {}",
        format_optional_timestamp(settings.last_full_sync_at)
    ));
    lines.push(format!(
        "Messages:         {} total, {} synced, {} pending, {} dead-lettered",
        report.stats.total, report.stats.synced, report.stats.pending, report.stats.dead_lettered
    ));
    lines
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(courier_core::util::normalize_text_option(Some(buffer)))
}
