use courier_core::services::DatabaseService;
use courier_core::util::{normalize_text_option, unix_millis_now};
use courier_core::{SyncMode, SyncSettings};
use serde::Serialize;

use crate::auth::{resolve_token, TokenStore};
use crate::cli::ConfigCommands;
use crate::cli_config::RuntimeConfig;
use crate::commands::common::{format_optional_timestamp, open_database};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct ConfigView {
    pub db_path: String,
    pub origin_path: Option<String>,
    pub api_base_url: String,
    pub token_source: Option<&'static str>,
    pub max_attempts: u32,
    pub full_sync_interval_secs: u64,
    pub settings: SyncSettings,
}

pub async fn run_config(command: ConfigCommands, runtime: &RuntimeConfig) -> Result<(), CliError> {
    let db = open_database(&runtime.db_path)?;

    match command {
        ConfigCommands::Show { json } => {
            let view = load_config_view(&db, runtime).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_config_view(&view);
            }
        }
        ConfigCommands::Enable => {
            let settings = set_enabled(&db, true).await?;
            println!("Sync enabled (mode {})", settings.sync_mode);
            if settings.destination_id.is_none() {
                println!("No destination set. Run `courier config destination <id>`.");
            }
        }
        ConfigCommands::Disable => {
            set_enabled(&db, false).await?;
            println!("Sync disabled");
        }
        ConfigCommands::Destination { id } => {
            let settings = set_destination(&db, &id).await?;
            println!(
                "Destination set to {}",
                settings.destination_id.as_deref().unwrap_or_default()
            );
        }
        ConfigCommands::Mode { mode } => {
            let settings = set_mode(&db, mode.into(), unix_millis_now()).await?;
            match (settings.sync_mode, settings.sync_enabled_since) {
                (SyncMode::NewOnly, since) => println!(
                    "Mode set to {} (messages since {})",
                    settings.sync_mode,
                    format_optional_timestamp(since)
                ),
                (SyncMode::All, _) => println!("Mode set to {}", settings.sync_mode),
            }
        }
    }

    Ok(())
}

pub async fn load_config_view(
    db: &DatabaseService,
    runtime: &RuntimeConfig,
) -> Result<ConfigView, CliError> {
    let token_source = resolve_token(&TokenStore::new())?.map(|(_, source)| source.label());

    Ok(ConfigView {
        db_path: runtime.db_path.display().to_string(),
        origin_path: runtime
            .origin_path
            .as_deref()
            .map(|path| path.display().to_string()),
        api_base_url: runtime.api_base_url.clone(),
        token_source,
        max_attempts: runtime.engine.max_attempts,
        full_sync_interval_secs: runtime.engine.full_sync_interval.as_secs(),
        settings: db.load_settings().await?,
    })
}

fn print_config_view(view: &ConfigView) {
    println!("Ledger:         {}", view.db_path);
    println!(
        "Origin:         {}",
        view.origin_path.as_deref().unwrap_or("(not set)")
    );
    println!("API base URL:   {}", view.api_base_url);
    println!(
        "Bot token:      {}",
        view.token_source.unwrap_or("(not set)")
    );
    println!("Max attempts:   {}", view.max_attempts);
    println!("Full interval:  {}s", view.full_sync_interval_secs);
    println!(
        "Sync:           {}",
        if view.settings.sync_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("Mode:           {}", view.settings.sync_mode);
    println!(
        "Destination:    {}",
        view.settings.destination_id.as_deref().unwrap_or("(not set)")
    );
}

pub async fn set_enabled(db: &DatabaseService, enabled: bool) -> Result<SyncSettings, CliError> {
    let mut settings = db.load_settings().await?;
    settings.sync_enabled = enabled;
    db.save_settings(&settings).await?;
    tracing::info!(enabled, "Sync switch updated");
    Ok(settings)
}

pub async fn set_destination(db: &DatabaseService, id: &str) -> Result<SyncSettings, CliError> {
    let destination =
        normalize_text_option(Some(id.to_string())).ok_or(CliError::EmptyDestination)?;
    let mut settings = db.load_settings().await?;
    settings.destination_id = Some(destination);
    db.save_settings(&settings).await?;
    Ok(settings)
}

pub async fn set_mode(
    db: &DatabaseService,
    mode: SyncMode,
    now: i64,
) -> Result<SyncSettings, CliError> {
    Ok(db.set_sync_mode(mode, now).await?)
}
