//! Origin provider reading an SMS-style `SQLite` store

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params_from_iter, Connection, OpenFlags};
use tokio::sync::broadcast;

use super::{OriginChange, OriginFilter, OriginProvider, OriginRecord, SortOrder};
use crate::error::{Error, Result};

const CHANGE_CAPACITY: usize = 64;

const RECORD_COLUMNS: &str = "CAST(_id AS TEXT), COALESCE(thread_id, 0), \
     COALESCE(address, ''), date, COALESCE(type, 0), COALESCE(body, '')";

struct Inner {
    conn: Connection,
    data_version: i64,
}

/// Reads the `sms` table of a device message store opened read-only.
///
/// Changes made by other connections are detected by polling
/// `PRAGMA data_version` through [`SqliteOriginProvider::poll_for_changes`].
pub struct SqliteOriginProvider {
    inner: Mutex<Inner>,
    changes: broadcast::Sender<OriginChange>,
}

impl SqliteOriginProvider {
    /// Open the origin store at `path` read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|error| Error::Origin(format!("{}: {error}", path.display())))?;
        Self::from_connection(conn)
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let data_version = read_data_version(&conn)?;
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Ok(Self {
            inner: Mutex::new(Inner { conn, data_version }),
            changes,
        })
    }

    /// Check whether another connection committed since the last poll and
    /// notify subscribers if so.
    pub fn poll_for_changes(&self) -> Result<bool> {
        let changed = {
            let mut inner = self.lock();
            let version = read_data_version(&inner.conn)?;
            let changed = version != inner.data_version;
            inner.data_version = version;
            changed
        };

        if changed {
            tracing::debug!("Origin store changed");
            let _ = self.changes.send(OriginChange {
                observed_at: crate::util::unix_millis_now(),
            });
        }
        Ok(changed)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OriginProvider for SqliteOriginProvider {
    fn read_records(
        &self,
        filter: &OriginFilter,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<OriginRecord>> {
        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM sms");
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        match filter {
            OriginFilter::All => {}
            OriginFilter::After(timestamp) => {
                sql.push_str(" WHERE date > ?");
                values.push((*timestamp).into());
            }
            OriginFilter::ById(id) => {
                sql.push_str(" WHERE CAST(_id AS TEXT) = ?");
                values.push(id.clone().into());
            }
        }

        sql.push_str(match order {
            SortOrder::NewestFirst => " ORDER BY date DESC, _id DESC",
            SortOrder::OldestFirst => " ORDER BY date ASC, _id ASC",
        });

        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            values.push((limit as i64).into());
        }

        let inner = self.lock();
        let mut stmt = inner
            .conn
            .prepare(&sql)
            .map_err(|error| Error::Origin(error.to_string()))?;
        let records = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(OriginRecord {
                    id: row.get(0)?,
                    thread_id: row.get(1)?,
                    address: row.get(2)?,
                    timestamp: row.get(3)?,
                    kind: row.get(4)?,
                    body: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn subscribe(&self) -> broadcast::Receiver<OriginChange> {
        self.changes.subscribe()
    }
}

fn read_data_version(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    const SCHEMA: &str = "CREATE TABLE sms (
        _id INTEGER PRIMARY KEY,
        thread_id INTEGER,
        address TEXT,
        date INTEGER NOT NULL,
        type INTEGER,
        body TEXT
    );";

    fn insert(conn: &Connection, id: i64, date: i64, kind: i64, body: Option<&str>) {
        conn.execute(
            "INSERT INTO sms (_id, thread_id, address, date, type, body) VALUES (?, 3, '+15550100', ?, ?, ?)",
            rusqlite::params![id, date, kind, body],
        )
        .unwrap();
    }

    #[test]
    fn reads_filters_and_orders_records() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("mmssms.db");
        let writer = Connection::open(&path).unwrap();
        writer.execute_batch(SCHEMA).unwrap();
        insert(&writer, 1, 100, 1, Some("first"));
        insert(&writer, 2, 200, 2, Some("second"));
        insert(&writer, 3, 300, 1, None);

        let provider = SqliteOriginProvider::open(&path).unwrap();

        let newest = provider
            .read_records(&OriginFilter::All, SortOrder::NewestFirst, Some(2))
            .unwrap();
        let ids: Vec<&str> = newest.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2"]);
        assert_eq!(newest[0].body, "");

        let after = provider
            .read_records(&OriginFilter::After(100), SortOrder::OldestFirst, None)
            .unwrap();
        let ids: Vec<&str> = after.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);

        let by_id = provider
            .read_records(&OriginFilter::ById("2".to_string()), SortOrder::NewestFirst, None)
            .unwrap();
        assert_eq!(
            by_id,
            vec![OriginRecord {
                id: "2".to_string(),
                thread_id: 3,
                address: "+15550100".to_string(),
                timestamp: 200,
                kind: 2,
                body: "second".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn poll_detects_commits_from_other_connections() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("mmssms.db");
        let writer = Connection::open(&path).unwrap();
        writer.execute_batch(SCHEMA).unwrap();

        let provider = SqliteOriginProvider::open(&path).unwrap();
        let mut changes = provider.subscribe();
        assert!(!provider.poll_for_changes().unwrap());

        insert(&writer, 1, 100, 1, Some("hello"));
        assert!(provider.poll_for_changes().unwrap());
        assert!(changes.recv().await.is_ok());
        assert!(!provider.poll_for_changes().unwrap());
    }

    #[test]
    fn missing_store_is_an_origin_error() {
        let tmp = tempdir().unwrap();
        let result = SqliteOriginProvider::open(tmp.path().join("absent.db"));
        assert!(matches!(result, Err(Error::Origin(_))));
    }
}
