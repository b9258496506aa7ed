use std::path::Path;

use clap::Parser;
use courier_core::config::EngineConfig;
use courier_core::db::FailedAttempt;
use courier_core::models::{Direction, MirrorMismatch};
use courier_core::services::DatabaseService;
use courier_core::{LocalMessage, SyncMode};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::auth::{resolve_token_from, TokenSource, TokenStore};
use crate::cli::{Cli, Commands, ConfigCommands, ModeArg, TokenCommands};
use crate::cli_config::RuntimeConfig;
use crate::commands::common::{
    format_dead_letter_lines, format_mismatch_line, format_status_lines, format_timestamp,
    message_preview,
};
use crate::commands::config::{set_destination, set_enabled, set_mode};
use crate::commands::ledger::prune_cutoff;
use crate::commands::status::load_status;
use crate::error::CliError;

fn runtime_for(db_path: &Path) -> RuntimeConfig {
    RuntimeConfig {
        db_path: db_path.to_path_buf(),
        origin_path: None,
        api_base_url: "https://api.example.com".to_string(),
        engine: EngineConfig::default(),
    }
}

fn message(id: &str, timestamp: i64, body: &str) -> LocalMessage {
    LocalMessage::new(id, 1, "+15550100", timestamp, Direction::Received, body)
}

#[test]
fn parses_sync_flags() {
    let cli = Cli::try_parse_from(["courier", "sync", "--force", "--destination", "-100"]).unwrap();
    match cli.command {
        Commands::Sync { force, destination } => {
            assert!(force);
            assert_eq!(destination.as_deref(), Some("-100"));
        }
        _ => panic!("expected sync command"),
    }
}

#[test]
fn parses_global_paths_after_subcommand() {
    let cli = Cli::try_parse_from([
        "courier",
        "status",
        "--json",
        "--db-path",
        "/tmp/ledger.db",
        "--origin-path",
        "/tmp/mmssms.db",
    ])
    .unwrap();
    assert!(matches!(cli.command, Commands::Status { json: true }));
    assert_eq!(
        cli.db_path.as_deref(),
        Some(Path::new("/tmp/ledger.db"))
    );
    assert_eq!(
        cli.origin_path.as_deref(),
        Some(Path::new("/tmp/mmssms.db"))
    );
}

#[test]
fn parses_config_mode_and_token_commands() {
    let cli = Cli::try_parse_from(["courier", "config", "mode", "new-only"]).unwrap();
    match cli.command {
        Commands::Config {
            command: ConfigCommands::Mode { mode },
        } => {
            assert_eq!(mode, ModeArg::NewOnly);
            assert_eq!(SyncMode::from(mode), SyncMode::NewOnly);
        }
        _ => panic!("expected config mode command"),
    }

    let cli = Cli::try_parse_from(["courier", "token", "set"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Token {
            command: TokenCommands::Set { token: None }
        }
    ));
}

#[test]
fn destination_accepts_negative_chat_ids() {
    let cli = Cli::try_parse_from(["courier", "config", "destination", "-1001234"]).unwrap();
    match cli.command {
        Commands::Config {
            command: ConfigCommands::Destination { id },
        } => assert_eq!(id, "-1001234"),
        _ => panic!("expected config destination command"),
    }
}

#[test]
fn watch_rejects_tiny_poll_interval() {
    assert!(Cli::try_parse_from(["courier", "watch", "--poll-ms", "10"]).is_err());
    let cli = Cli::try_parse_from(["courier", "watch"]).unwrap();
    assert!(matches!(cli.command, Commands::Watch { poll_ms: 1000 }));
}

#[test]
fn dead_letters_defaults_limit() {
    let cli = Cli::try_parse_from(["courier", "dead-letters"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::DeadLetters {
            limit: 20,
            json: false
        }
    ));
}

#[test]
fn format_timestamp_returns_utc_label() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn message_preview_collapses_whitespace_and_truncates() {
    let msg = message("1", 0, "Your code is\n\n 123456. Do not share it with anyone");
    assert_eq!(message_preview(&msg, 20), "Your code is 1234...");
    assert_eq!(message_preview(&message("2", 0, "short"), 20), "short");
}

#[test]
fn dead_letter_lines_include_key_fields() {
    let mut msg = message("42", 0, "hello");
    msg.sync_attempts = 3;
    msg.last_sync_error = Some("400: Bad Request: chat not found".to_string());

    let rendered = format_dead_letter_lines(&[msg]);
    assert_eq!(rendered.len(), 1);
    assert!(rendered[0].starts_with("42  1970-01-01 00:00:00 UTC"));
    assert!(rendered[0].contains("attempts=3"));
    assert!(rendered[0].contains("chat not found"));
}

#[test]
fn mismatch_lines_name_both_sides() {
    let missing = MirrorMismatch::MissingMirror {
        local_id: "7".to_string(),
        remote_id: None,
    };
    let orphan = MirrorMismatch::OrphanMirror {
        remote_id: "900".to_string(),
        origin_local_id: "8".to_string(),
    };
    assert_eq!(
        format_mismatch_line(&missing),
        "missing mirror: message=7 remote=-"
    );
    assert_eq!(
        format_mismatch_line(&orphan),
        "orphan mirror: remote=900 message=8"
    );
}

#[test]
fn prune_cutoff_subtracts_whole_days() {
    assert_eq!(prune_cutoff(10 * 86_400_000, 3), 7 * 86_400_000);
    assert_eq!(prune_cutoff(0, u32::MAX), -i64::from(u32::MAX) * 86_400_000);
}

// One test owns the process-wide in-memory token store.
#[test]
fn token_store_roundtrip_and_env_precedence() {
    let store = TokenStore::new();
    store.clear().unwrap();
    assert_eq!(resolve_token_from(None, &store).unwrap(), None);

    assert!(matches!(store.save("   "), Err(CliError::EmptyToken)));

    store.save("  123:abc \n").unwrap();
    assert_eq!(store.load().unwrap().as_deref(), Some("123:abc"));
    assert_eq!(
        resolve_token_from(None, &store).unwrap(),
        Some(("123:abc".to_string(), TokenSource::Keychain))
    );
    assert_eq!(
        resolve_token_from(Some("456:env".to_string()), &store).unwrap(),
        Some(("456:env".to_string(), TokenSource::Environment))
    );
    assert_eq!(
        resolve_token_from(Some("  ".to_string()), &store).unwrap(),
        Some(("123:abc".to_string(), TokenSource::Keychain))
    );

    store.clear().unwrap();
    assert_eq!(store.load().unwrap(), None);
}

#[tokio::test(flavor = "current_thread")]
async fn config_commands_update_persisted_settings() {
    let tmp = tempdir().unwrap();
    let db = DatabaseService::open_path(tmp.path().join("ledger.db")).unwrap();

    let settings = set_enabled(&db, true).await.unwrap();
    assert!(settings.sync_enabled);

    assert!(matches!(
        set_destination(&db, "  ").await,
        Err(CliError::EmptyDestination)
    ));
    let settings = set_destination(&db, " -1001234 ").await.unwrap();
    assert_eq!(settings.destination_id.as_deref(), Some("-1001234"));

    let settings = set_mode(&db, SyncMode::NewOnly, 5_000).await.unwrap();
    assert_eq!(settings.sync_enabled_since, Some(5_000));
    let settings = set_mode(&db, SyncMode::NewOnly, 9_000).await.unwrap();
    assert_eq!(settings.sync_enabled_since, Some(5_000));

    let settings = set_enabled(&db, false).await.unwrap();
    assert!(!settings.sync_enabled);
    assert_eq!(settings.destination_id.as_deref(), Some("-1001234"));

    let reloaded = db.load_settings().await.unwrap();
    assert_eq!(reloaded, settings);
}

#[tokio::test(flavor = "current_thread")]
async fn status_reports_ledger_counts() {
    let tmp = tempdir().unwrap();
    let db_path = tmp.path().join("ledger.db");
    {
        let db = DatabaseService::open_path(&db_path).unwrap();
        db.merge_messages(&[
            message("1", 1_000, "first"),
            message("2", 2_000, "second"),
            message("3", 3_000, "third"),
        ])
        .await
        .unwrap();
        db.record_failures(
            &[FailedAttempt {
                local_id: "2".to_string(),
                error: "400: Bad Request: chat not found".to_string(),
                attempted_at: 4_000,
                dead_letter: true,
            }],
            3,
        )
        .await
        .unwrap();
        set_destination(&db, "-100").await.unwrap();
    }

    let report = load_status(&runtime_for(&db_path)).await.unwrap();
    assert_eq!(report.stats.total, 3);
    assert_eq!(report.stats.synced, 0);
    assert_eq!(report.stats.pending, 2);
    assert_eq!(report.stats.dead_lettered, 1);

    let lines = format_status_lines(&report);
    assert!(lines.iter().any(|line| line.contains("disabled")));
    assert!(lines.iter().any(|line| line.contains("-100")));
    assert!(lines
        .iter()
        .any(|line| line.contains("3 total, 0 synced, 2 pending, 1 dead-lettered")));
    assert!(lines.iter().any(|line| line.contains("never")));
}
