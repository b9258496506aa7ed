//! In-process origin provider

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use super::{OriginChange, OriginFilter, OriginProvider, OriginRecord, SortOrder};
use crate::error::Result;

const CHANGE_CAPACITY: usize = 64;

/// Origin provider backed by a vector, for embedding hosts and tests.
pub struct MemoryOriginProvider {
    records: Mutex<Vec<OriginRecord>>,
    changes: broadcast::Sender<OriginChange>,
}

impl MemoryOriginProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    #[must_use]
    pub fn with_records(records: Vec<OriginRecord>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            records: Mutex::new(records),
            changes,
        }
    }

    /// Add or replace a record and notify subscribers.
    pub fn push(&self, record: OriginRecord) {
        let observed_at = record.timestamp;
        {
            let mut records = self.lock();
            match records.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => *existing = record,
                None => records.push(record),
            }
        }
        // No subscribers is fine
        let _ = self.changes.send(OriginChange { observed_at });
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OriginRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryOriginProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OriginProvider for MemoryOriginProvider {
    fn read_records(
        &self,
        filter: &OriginFilter,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<OriginRecord>> {
        let mut matched: Vec<OriginRecord> = self
            .lock()
            .iter()
            .filter(|record| match filter {
                OriginFilter::All => true,
                OriginFilter::After(timestamp) => record.timestamp > *timestamp,
                OriginFilter::ById(id) => record.id == *id,
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        if order == SortOrder::NewestFirst {
            matched.reverse();
        }
        if let Some(limit) = limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn subscribe(&self) -> broadcast::Receiver<OriginChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, timestamp: i64) -> OriginRecord {
        OriginRecord {
            id: id.to_string(),
            thread_id: 7,
            address: "ACME".to_string(),
            timestamp,
            kind: 1,
            body: format!("body {id}"),
        }
    }

    #[tokio::test]
    async fn push_notifies_subscribers() {
        let provider = MemoryOriginProvider::new();
        let mut changes = provider.subscribe();

        provider.push(record("1", 100));

        let change = changes.recv().await.unwrap();
        assert_eq!(change.observed_at, 100);
        assert_eq!(provider.len(), 1);
    }

    #[test]
    fn push_replaces_record_with_same_id() {
        let provider = MemoryOriginProvider::with_records(vec![record("1", 100)]);

        let mut edited = record("1", 100);
        edited.body = "edited".to_string();
        provider.push(edited);

        let records = provider
            .read_records(&OriginFilter::All, SortOrder::OldestFirst, None)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].body, "edited");
    }

    #[test]
    fn ties_on_timestamp_are_ordered_by_id() {
        let provider = MemoryOriginProvider::with_records(vec![record("b", 100), record("a", 100)]);

        let ids: Vec<String> = provider
            .read_records(&OriginFilter::All, SortOrder::OldestFirst, None)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
