//! Message source: reads origin records and shapes them into ledger rows.
//!
//! Reads are pure. Persisting what was read is the caller's job, through
//! [`DatabaseService::merge_messages`](crate::services::DatabaseService::merge_messages).

mod memory;
mod sqlite;

pub use memory::MemoryOriginProvider;
pub use sqlite::SqliteOriginProvider;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::models::{Direction, LocalMessage};

/// Default bound on a full origin scan.
pub const DEFAULT_SCAN_CAP: usize = 500;

/// Rows converted between cooperative yields.
const YIELD_EVERY: usize = 50;

/// A raw record as the origin stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginRecord {
    pub id: String,
    pub thread_id: i64,
    pub address: String,
    /// Event time (Unix ms)
    pub timestamp: i64,
    /// Origin type code (1 = received, 2 = sent)
    pub kind: i64,
    pub body: String,
}

impl OriginRecord {
    /// Convert into an unsynced ledger row.
    #[must_use]
    pub fn into_local(self) -> LocalMessage {
        LocalMessage::new(
            self.id,
            self.thread_id,
            self.address,
            self.timestamp,
            Direction::from_origin_kind(self.kind),
            self.body,
        )
    }
}

/// Which origin records to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginFilter {
    All,
    /// Records strictly newer than the given timestamp
    After(i64),
    ById(String),
}

/// Timestamp ordering of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    NewestFirst,
    OldestFirst,
}

/// Notification that the origin's contents may have changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginChange {
    /// When the change was observed (Unix ms)
    pub observed_at: i64,
}

/// Access to the device's message store.
pub trait OriginProvider: Send + Sync {
    /// Read records matching `filter` in the given order.
    fn read_records(
        &self,
        filter: &OriginFilter,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<OriginRecord>>;

    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<OriginChange>;
}

/// Reads origin records and turns them into ledger rows.
pub struct MessageSource<P> {
    provider: P,
    scan_cap: usize,
}

impl<P: OriginProvider> MessageSource<P> {
    pub const fn new(provider: P) -> Self {
        Self {
            provider,
            scan_cap: DEFAULT_SCAN_CAP,
        }
    }

    #[must_use]
    pub const fn with_scan_cap(mut self, scan_cap: usize) -> Self {
        self.scan_cap = scan_cap;
        self
    }

    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Newest-first scan bounded to the scan cap.
    pub async fn read_all(&self) -> Result<Vec<LocalMessage>> {
        let records =
            self.provider
                .read_records(&OriginFilter::All, SortOrder::NewestFirst, Some(self.scan_cap))?;
        let messages = convert(records).await;
        tracing::debug!(count = messages.len(), "Read full origin scan");
        Ok(messages)
    }

    /// Records strictly newer than `timestamp`, oldest first.
    pub async fn read_after(&self, timestamp: i64) -> Result<Vec<LocalMessage>> {
        let records = self.provider.read_records(
            &OriginFilter::After(timestamp),
            SortOrder::OldestFirst,
            None,
        )?;
        Ok(convert(records).await)
    }

    /// A single record by origin id.
    pub fn read_by_id(&self, id: &str) -> Result<LocalMessage> {
        self.provider
            .read_records(&OriginFilter::ById(id.to_string()), SortOrder::NewestFirst, Some(1))?
            .into_iter()
            .next()
            .map(OriginRecord::into_local)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OriginChange> {
        self.provider.subscribe()
    }
}

async fn convert(records: Vec<OriginRecord>) -> Vec<LocalMessage> {
    let mut messages = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        if index > 0 && index % YIELD_EVERY == 0 {
            tokio::task::yield_now().await;
        }
        messages.push(record.into_local());
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(id: &str, timestamp: i64, body: &str) -> OriginRecord {
        OriginRecord {
            id: id.to_string(),
            thread_id: 1,
            address: "+15550100".to_string(),
            timestamp,
            kind: 1,
            body: body.to_string(),
        }
    }

    fn source_with(records: Vec<OriginRecord>) -> MessageSource<MemoryOriginProvider> {
        MessageSource::new(MemoryOriginProvider::with_records(records))
    }

    #[tokio::test]
    async fn read_all_is_newest_first_and_capped() {
        let records = (1..=120).map(|i| record(&i.to_string(), i, "x")).collect();
        let source = source_with(records).with_scan_cap(100);

        let messages = source.read_all().await.unwrap();
        assert_eq!(messages.len(), 100);
        assert_eq!(messages[0].id, "120");
        assert_eq!(messages[99].id, "21");
    }

    #[tokio::test]
    async fn read_after_is_strict_and_ascending() {
        let source = source_with(vec![
            record("3", 300, "c"),
            record("1", 100, "a"),
            record("2", 200, "b"),
        ]);

        let ids: Vec<String> = source
            .read_after(100)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["2".to_string(), "3".to_string()]);
    }

    #[test]
    fn read_by_id_reports_not_found() {
        let source = source_with(vec![record("1", 100, "hi")]);

        let message = source.read_by_id("1").unwrap();
        assert_eq!(message.body, "hi");
        assert_eq!(message.direction, Direction::Received);
        assert!(!message.is_synced);

        assert!(matches!(source.read_by_id("9"), Err(Error::NotFound(id)) if id == "9"));
    }

    #[test]
    fn origin_kind_maps_to_direction() {
        let mut sent = record("1", 1, "x");
        sent.kind = 2;
        assert_eq!(sent.into_local().direction, Direction::Sent);

        let mut draft = record("2", 1, "x");
        draft.kind = 3;
        assert_eq!(draft.into_local().direction, Direction::Other);
    }
}
