//! Database migrations

use crate::error::{Error, Result};
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        apply(conn, 1, MIGRATION_V1)?;
    }
    if version < 2 {
        apply(conn, 2, MIGRATION_V2)?;
    }
    if version < 3 {
        apply_rebuild(conn, 3, MIGRATION_V3)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Apply one migration script and record its version atomically
fn apply(conn: &Connection, version: i32, script: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(script)?;
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?)",
        [version],
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version {version} (target {CURRENT_VERSION})");
    Ok(())
}

/// Apply a script that recreates tables.
///
/// Foreign keys are switched off around the transaction so dropping the old
/// tables does not cascade, and re-checked before commit.
fn apply_rebuild(conn: &Connection, version: i32, script: &str) -> Result<()> {
    let foreign_keys: bool = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    // Has no effect inside a transaction
    conn.pragma_update(None, "foreign_keys", false)?;

    let result = rebuild_in_transaction(conn, version, script);

    conn.pragma_update(None, "foreign_keys", foreign_keys)?;
    if result.is_ok() {
        tracing::info!("Migrated database to version {version} (target {CURRENT_VERSION})");
    }
    result
}

fn rebuild_in_transaction(conn: &Connection, version: i32, script: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(script)?;
    let violations: i64 = tx.query_row("SELECT COUNT(*) FROM pragma_foreign_key_check", [], |row| {
        row.get(0)
    })?;
    if violations > 0 {
        return Err(Error::Database(format!(
            "migration {version} left {violations} foreign key violation(s)"
        )));
    }
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?)",
        [version],
    )?;
    tx.commit()?;
    Ok(())
}

/// Version 1: ledger, mirror and settings tables
const MIGRATION_V1: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    );

    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        thread_id INTEGER NOT NULL DEFAULT 0,
        address TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        direction TEXT NOT NULL,
        body TEXT NOT NULL,
        remote_id TEXT UNIQUE,
        is_synced INTEGER NOT NULL DEFAULT 0,
        synced_at INTEGER,
        sync_attempts INTEGER NOT NULL DEFAULT 0,
        last_sync_attempt INTEGER,
        last_sync_error TEXT,
        CHECK (is_synced = 0 OR (remote_id IS NOT NULL AND synced_at IS NOT NULL))
    );
    CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);

    CREATE TABLE IF NOT EXISTS remote_mirror (
        remote_id TEXT PRIMARY KEY,
        origin_local_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
        address TEXT NOT NULL,
        body TEXT NOT NULL,
        origin_timestamp INTEGER NOT NULL,
        synced_at INTEGER NOT NULL,
        destination_channel_id TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_remote_mirror_origin ON remote_mirror(origin_local_id);

    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Version 2: partial index backing eligible-message selection
const MIGRATION_V2: &str = "
    CREATE INDEX IF NOT EXISTS idx_messages_pending
        ON messages(timestamp, sync_attempts)
        WHERE is_synced = 0;
";

/// Version 3: remote ids are only unique within one destination
const MIGRATION_V3: &str = "
    CREATE TABLE messages_v3 (
        id TEXT PRIMARY KEY,
        thread_id INTEGER NOT NULL DEFAULT 0,
        address TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        direction TEXT NOT NULL,
        body TEXT NOT NULL,
        remote_id TEXT,
        is_synced INTEGER NOT NULL DEFAULT 0,
        synced_at INTEGER,
        sync_attempts INTEGER NOT NULL DEFAULT 0,
        last_sync_attempt INTEGER,
        last_sync_error TEXT,
        CHECK (is_synced = 0 OR (remote_id IS NOT NULL AND synced_at IS NOT NULL))
    );
    INSERT INTO messages_v3 (id, thread_id, address, timestamp, direction, body, remote_id,
                             is_synced, synced_at, sync_attempts, last_sync_attempt,
                             last_sync_error)
        SELECT id, thread_id, address, timestamp, direction, body, remote_id,
               is_synced, synced_at, sync_attempts, last_sync_attempt, last_sync_error
        FROM messages;

    CREATE TABLE remote_mirror_v3 (
        destination_channel_id TEXT NOT NULL,
        remote_id TEXT NOT NULL,
        origin_local_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
        address TEXT NOT NULL,
        body TEXT NOT NULL,
        origin_timestamp INTEGER NOT NULL,
        synced_at INTEGER NOT NULL,
        PRIMARY KEY (destination_channel_id, remote_id)
    );
    INSERT INTO remote_mirror_v3 (destination_channel_id, remote_id, origin_local_id, address,
                                  body, origin_timestamp, synced_at)
        SELECT destination_channel_id, remote_id, origin_local_id, address,
               body, origin_timestamp, synced_at
        FROM remote_mirror;

    DROP TABLE remote_mirror;
    DROP TABLE messages;
    ALTER TABLE messages_v3 RENAME TO messages;
    ALTER TABLE remote_mirror_v3 RENAME TO remote_mirror;

    CREATE INDEX idx_messages_timestamp ON messages(timestamp);
    CREATE INDEX idx_messages_pending
        ON messages(timestamp, sync_attempts)
        WHERE is_synced = 0;
    CREATE INDEX idx_remote_mirror_origin ON remote_mirror(origin_local_id);
";
