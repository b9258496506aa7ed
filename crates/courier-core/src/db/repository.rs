//! Ledger and mirror repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::{Error, Result};
use crate::models::{LedgerStats, LocalMessage, MirrorMismatch, RemoteMirrorRecord};
use rusqlite::{params, Connection, OptionalExtension};

const MESSAGE_COLUMNS: &str = "id, thread_id, address, timestamp, direction, body, remote_id, \
     is_synced, synced_at, sync_attempts, last_sync_attempt, last_sync_error";

const MIRROR_COLUMNS: &str = "remote_id, origin_local_id, address, body, origin_timestamp, \
     synced_at, destination_channel_id";

/// Successful delivery reported by the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub local_id: String,
    pub remote_id: String,
    pub destination: String,
    pub synced_at: i64,
}

/// Failed delivery attempt awaiting its ledger write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    pub local_id: String,
    pub error: String,
    pub attempted_at: i64,
    /// Jump straight to the attempt cap instead of counting one attempt
    pub dead_letter: bool,
}

/// Counts produced by merging origin records into the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Rows that did not exist before
    pub inserted: usize,
    /// Existing rows whose content fields changed
    pub refreshed: usize,
}

/// Trait for ledger storage operations
pub trait LedgerRepository {
    /// Insert new origin records and refresh content of known ones.
    ///
    /// Delivery-state columns of existing rows are never touched.
    fn merge(&self, incoming: &[LocalMessage]) -> Result<MergeOutcome>;

    /// Get a message by origin id
    fn get(&self, id: &str) -> Result<Option<LocalMessage>>;

    /// Unsynced messages under the attempt cap at or after `watermark`, oldest first
    fn select_eligible(
        &self,
        watermark: Option<i64>,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<LocalMessage>>;

    /// Newest origin timestamp stored in the ledger
    fn latest_timestamp(&self) -> Result<Option<i64>>;

    /// Mark a message delivered and record its mirror row in one transaction
    fn mark_synced(&self, delivery: &Delivery) -> Result<RemoteMirrorRecord>;

    /// Record a batch of failed attempts in one transaction
    fn record_failures(&self, failures: &[FailedAttempt], max_attempts: u32) -> Result<()>;

    /// Re-arm unsynced messages (all of them when `ids` is `None`)
    fn reset_attempts(&self, ids: Option<&[String]>) -> Result<usize>;

    /// Messages excluded from selection after exhausting their attempts
    fn list_dead_letters(&self, max_attempts: u32, limit: usize) -> Result<Vec<LocalMessage>>;

    /// Aggregate ledger counts
    fn stats(&self, max_attempts: u32) -> Result<LedgerStats>;

    /// Retention: delete messages older than `cutoff` along with their mirror rows
    fn delete_before(&self, cutoff: i64, synced_only: bool) -> Result<usize>;

    /// Restore delivery state of unsynced rows that the mirror shows as delivered
    fn repair_from_mirror(&self) -> Result<usize>;
}

/// Trait for remote mirror read operations
pub trait MirrorRepository {
    /// Get a mirror row by remote id within one destination
    fn get(&self, destination: &str, remote_id: &str) -> Result<Option<RemoteMirrorRecord>>;

    /// Get the mirror row recorded for a ledger message
    fn find_by_local_id(&self, local_id: &str) -> Result<Option<RemoteMirrorRecord>>;

    /// List mirror rows, most recent delivery first
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<RemoteMirrorRecord>>;

    /// Report every break in the ledger/mirror correspondence
    fn find_mismatches(&self) -> Result<Vec<MirrorMismatch>>;
}

/// `SQLite` implementation of `LedgerRepository`
pub struct SqliteLedgerRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteLedgerRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a message from a database row
    fn parse_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<LocalMessage> {
        let direction: String = row.get(4)?;
        Ok(LocalMessage {
            id: row.get(0)?,
            thread_id: row.get(1)?,
            address: row.get(2)?,
            timestamp: row.get(3)?,
            direction: direction.parse().unwrap_or_default(),
            body: row.get(5)?,
            remote_id: row.get(6)?,
            is_synced: row.get::<_, i32>(7)? != 0,
            synced_at: row.get(8)?,
            sync_attempts: row.get(9)?,
            last_sync_attempt: row.get(10)?,
            last_sync_error: row.get(11)?,
        })
    }
}

impl LedgerRepository for SqliteLedgerRepository<'_> {
    fn merge(&self, incoming: &[LocalMessage]) -> Result<MergeOutcome> {
        let mut outcome = MergeOutcome::default();
        if incoming.is_empty() {
            return Ok(outcome);
        }

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO messages (id, thread_id, address, timestamp, direction, body)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO NOTHING",
            )?;
            let mut refresh = tx.prepare(
                "UPDATE messages
                 SET thread_id = ?1, address = ?2, timestamp = ?3, direction = ?4, body = ?5
                 WHERE id = ?6
                   AND (thread_id IS NOT ?1 OR address IS NOT ?2 OR timestamp IS NOT ?3
                        OR direction IS NOT ?4 OR body IS NOT ?5)",
            )?;

            for message in incoming {
                let inserted = insert.execute(params![
                    message.id,
                    message.thread_id,
                    message.address,
                    message.timestamp,
                    message.direction.as_str(),
                    message.body,
                ])?;
                if inserted > 0 {
                    outcome.inserted += 1;
                    continue;
                }
                outcome.refreshed += refresh.execute(params![
                    message.thread_id,
                    message.address,
                    message.timestamp,
                    message.direction.as_str(),
                    message.body,
                    message.id,
                ])?;
            }
        }
        tx.commit()?;

        Ok(outcome)
    }

    fn get(&self, id: &str) -> Result<Option<LocalMessage>> {
        let message = self
            .conn
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"),
                params![id],
                Self::parse_message,
            )
            .optional()?;
        Ok(message)
    }

    fn select_eligible(
        &self,
        watermark: Option<i64>,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<LocalMessage>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE is_synced = 0 AND sync_attempts < ? AND timestamp >= ?
             ORDER BY timestamp ASC, id ASC
             LIMIT ?"
        ))?;

        let messages = stmt
            .query_map(
                params![max_attempts, watermark.unwrap_or(i64::MIN), limit as i64],
                Self::parse_message,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(messages)
    }

    fn latest_timestamp(&self) -> Result<Option<i64>> {
        let latest = self
            .conn
            .query_row("SELECT MAX(timestamp) FROM messages", [], |row| row.get(0))?;
        Ok(latest)
    }

    fn mark_synced(&self, delivery: &Delivery) -> Result<RemoteMirrorRecord> {
        let tx = self.conn.unchecked_transaction()?;

        let current = tx
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"),
                params![delivery.local_id],
                Self::parse_message,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(delivery.local_id.clone()))?;

        if current.is_synced {
            return Err(Error::Database(format!(
                "message {} is already synced as {}",
                current.id,
                current.remote_id.unwrap_or_default()
            )));
        }

        tx.execute(
            "UPDATE messages
             SET is_synced = 1, remote_id = ?, synced_at = ?, last_sync_attempt = ?,
                 last_sync_error = NULL
             WHERE id = ?",
            params![
                delivery.remote_id,
                delivery.synced_at,
                delivery.synced_at,
                delivery.local_id
            ],
        )?;

        let record = RemoteMirrorRecord {
            remote_id: delivery.remote_id.clone(),
            origin_local_id: current.id,
            address: current.address,
            body: current.body,
            origin_timestamp: current.timestamp,
            synced_at: delivery.synced_at,
            destination_channel_id: delivery.destination.clone(),
        };
        tx.execute(
            &format!("INSERT INTO remote_mirror ({MIRROR_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"),
            params![
                record.remote_id,
                record.origin_local_id,
                record.address,
                record.body,
                record.origin_timestamp,
                record.synced_at,
                record.destination_channel_id,
            ],
        )?;

        tx.commit()?;
        Ok(record)
    }

    fn record_failures(&self, failures: &[FailedAttempt], max_attempts: u32) -> Result<()> {
        if failures.is_empty() {
            return Ok(());
        }

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE messages
                 SET sync_attempts = CASE
                         WHEN ?1 THEN MAX(sync_attempts, ?2)
                         ELSE MIN(sync_attempts + 1, ?2)
                     END,
                     last_sync_attempt = ?3,
                     last_sync_error = ?4
                 WHERE id = ?5 AND is_synced = 0",
            )?;
            for failure in failures {
                stmt.execute(params![
                    failure.dead_letter,
                    max_attempts,
                    failure.attempted_at,
                    failure.error,
                    failure.local_id,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn reset_attempts(&self, ids: Option<&[String]>) -> Result<usize> {
        let Some(ids) = ids else {
            let rows = self.conn.execute(
                "UPDATE messages SET sync_attempts = 0, last_sync_error = NULL
                 WHERE is_synced = 0 AND sync_attempts > 0",
                [],
            )?;
            return Ok(rows);
        };

        let tx = self.conn.unchecked_transaction()?;
        let mut rows = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE messages SET sync_attempts = 0, last_sync_error = NULL
                 WHERE id = ? AND is_synced = 0",
            )?;
            for id in ids {
                rows += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(rows)
    }

    fn list_dead_letters(&self, max_attempts: u32, limit: usize) -> Result<Vec<LocalMessage>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE is_synced = 0 AND sync_attempts >= ?
             ORDER BY last_sync_attempt DESC, timestamp DESC
             LIMIT ?"
        ))?;

        let messages = stmt
            .query_map(params![max_attempts, limit as i64], Self::parse_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(messages)
    }

    fn stats(&self, max_attempts: u32) -> Result<LedgerStats> {
        let stats = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(is_synced = 1), 0),
                    COALESCE(SUM(is_synced = 0 AND sync_attempts < ?1), 0),
                    COALESCE(SUM(is_synced = 0 AND sync_attempts >= ?1), 0)
             FROM messages",
            params![max_attempts],
            |row| {
                Ok(LedgerStats {
                    total: row.get(0)?,
                    synced: row.get(1)?,
                    pending: row.get(2)?,
                    dead_lettered: row.get(3)?,
                })
            },
        )?;
        Ok(stats)
    }

    fn delete_before(&self, cutoff: i64, synced_only: bool) -> Result<usize> {
        // Mirror rows follow through ON DELETE CASCADE
        let rows = self.conn.execute(
            "DELETE FROM messages WHERE timestamp < ? AND (is_synced = 1 OR NOT ?)",
            params![cutoff, synced_only],
        )?;
        Ok(rows)
    }

    fn repair_from_mirror(&self) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE messages
             SET is_synced = 1,
                 remote_id = (SELECT r.remote_id FROM remote_mirror r
                              WHERE r.origin_local_id = messages.id
                              ORDER BY r.synced_at ASC LIMIT 1),
                 synced_at = (SELECT r.synced_at FROM remote_mirror r
                              WHERE r.origin_local_id = messages.id
                              ORDER BY r.synced_at ASC LIMIT 1),
                 last_sync_error = NULL
             WHERE is_synced = 0
               AND EXISTS (SELECT 1 FROM remote_mirror r WHERE r.origin_local_id = messages.id)",
            [],
        )?;
        if rows > 0 {
            tracing::warn!(rows, "Restored delivery state from remote mirror");
        }
        Ok(rows)
    }
}

/// `SQLite` implementation of `MirrorRepository`
pub struct SqliteMirrorRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteMirrorRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RemoteMirrorRecord> {
        Ok(RemoteMirrorRecord {
            remote_id: row.get(0)?,
            origin_local_id: row.get(1)?,
            address: row.get(2)?,
            body: row.get(3)?,
            origin_timestamp: row.get(4)?,
            synced_at: row.get(5)?,
            destination_channel_id: row.get(6)?,
        })
    }
}

impl MirrorRepository for SqliteMirrorRepository<'_> {
    fn get(&self, destination: &str, remote_id: &str) -> Result<Option<RemoteMirrorRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {MIRROR_COLUMNS} FROM remote_mirror
                     WHERE destination_channel_id = ? AND remote_id = ?"
                ),
                params![destination, remote_id],
                Self::parse_record,
            )
            .optional()?;
        Ok(record)
    }

    fn find_by_local_id(&self, local_id: &str) -> Result<Option<RemoteMirrorRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {MIRROR_COLUMNS} FROM remote_mirror
                     WHERE origin_local_id = ?
                     ORDER BY synced_at ASC LIMIT 1"
                ),
                params![local_id],
                Self::parse_record,
            )
            .optional()?;
        Ok(record)
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<RemoteMirrorRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MIRROR_COLUMNS} FROM remote_mirror
             ORDER BY synced_at DESC
             LIMIT ? OFFSET ?"
        ))?;

        let records = stmt
            .query_map(params![limit as i64, offset as i64], Self::parse_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn find_mismatches(&self) -> Result<Vec<MirrorMismatch>> {
        let mut mismatches = Vec::new();

        let mut stmt = self.conn.prepare(
            "SELECT m.id, m.remote_id
             FROM messages m
             LEFT JOIN remote_mirror r
               ON r.remote_id = m.remote_id AND r.origin_local_id = m.id
             WHERE m.is_synced = 1 AND r.remote_id IS NULL
             ORDER BY m.timestamp",
        )?;
        let missing = stmt
            .query_map([], |row| {
                Ok(MirrorMismatch::MissingMirror {
                    local_id: row.get(0)?,
                    remote_id: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        mismatches.extend(missing);

        let mut stmt = self.conn.prepare(
            "SELECT r.remote_id, r.origin_local_id
             FROM remote_mirror r
             LEFT JOIN messages m
               ON m.remote_id = r.remote_id AND m.id = r.origin_local_id AND m.is_synced = 1
             WHERE m.id IS NULL
             ORDER BY r.synced_at",
        )?;
        let orphans = stmt
            .query_map([], |row| {
                Ok(MirrorMismatch::OrphanMirror {
                    remote_id: row.get(0)?,
                    origin_local_id: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        mismatches.extend(orphans);

        Ok(mismatches)
    }
}
