//! Shared database service wrapper used by the engine and its hosts.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    Database, Delivery, FailedAttempt, LedgerRepository, MergeOutcome, MirrorRepository,
    SettingsRepository, SqliteLedgerRepository, SqliteMirrorRepository,
    SqliteSettingsRepository,
};
use crate::models::{
    LedgerStats, LocalMessage, MirrorMismatch, RemoteMirrorRecord, SyncMode, SyncSettings,
};
use crate::Result;

/// Thread-safe service for DB and repository operations.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path)?;
        tracing::debug!("Opened ledger at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location of the ledger, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Merge origin records into the ledger.
    pub async fn merge_messages(&self, messages: &[LocalMessage]) -> Result<MergeOutcome> {
        let db = self.db.lock().await;
        SqliteLedgerRepository::new(db.connection()).merge(messages)
    }

    /// Fetch a ledger message by origin id.
    pub async fn get_message(&self, id: &str) -> Result<Option<LocalMessage>> {
        let db = self.db.lock().await;
        SqliteLedgerRepository::new(db.connection()).get(id)
    }

    /// Select messages eligible for delivery, oldest first.
    pub async fn select_eligible(
        &self,
        watermark: Option<i64>,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<LocalMessage>> {
        let db = self.db.lock().await;
        SqliteLedgerRepository::new(db.connection()).select_eligible(watermark, max_attempts, limit)
    }

    /// Newest origin timestamp in the ledger.
    pub async fn latest_timestamp(&self) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        SqliteLedgerRepository::new(db.connection()).latest_timestamp()
    }

    /// Record a successful delivery in the ledger and the mirror.
    pub async fn mark_synced(&self, delivery: &Delivery) -> Result<RemoteMirrorRecord> {
        let db = self.db.lock().await;
        SqliteLedgerRepository::new(db.connection()).mark_synced(delivery)
    }

    /// Record failed delivery attempts in one write.
    pub async fn record_failures(
        &self,
        failures: &[FailedAttempt],
        max_attempts: u32,
    ) -> Result<()> {
        let db = self.db.lock().await;
        SqliteLedgerRepository::new(db.connection()).record_failures(failures, max_attempts)
    }

    /// Re-arm dead-lettered messages.
    pub async fn reset_attempts(&self, ids: Option<&[String]>) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteLedgerRepository::new(db.connection()).reset_attempts(ids)
    }

    /// List dead-lettered messages.
    pub async fn list_dead_letters(
        &self,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<LocalMessage>> {
        let db = self.db.lock().await;
        SqliteLedgerRepository::new(db.connection()).list_dead_letters(max_attempts, limit)
    }

    /// Aggregate ledger counts.
    pub async fn stats(&self, max_attempts: u32) -> Result<LedgerStats> {
        let db = self.db.lock().await;
        SqliteLedgerRepository::new(db.connection()).stats(max_attempts)
    }

    /// Delete messages older than `cutoff` along with their mirror rows.
    pub async fn delete_before(&self, cutoff: i64, synced_only: bool) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteLedgerRepository::new(db.connection()).delete_before(cutoff, synced_only)
    }

    /// Restore ledger delivery state from the mirror.
    pub async fn repair_from_mirror(&self) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteLedgerRepository::new(db.connection()).repair_from_mirror()
    }

    /// Fetch a mirror row by remote id.
    pub async fn get_mirror(
        &self,
        destination: &str,
        remote_id: &str,
    ) -> Result<Option<RemoteMirrorRecord>> {
        let db = self.db.lock().await;
        SqliteMirrorRepository::new(db.connection()).get(destination, remote_id)
    }

    /// List mirror rows, newest delivery first.
    pub async fn list_mirror(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RemoteMirrorRecord>> {
        let db = self.db.lock().await;
        SqliteMirrorRepository::new(db.connection()).list(limit, offset)
    }

    /// Audit the ledger/mirror correspondence.
    pub async fn find_mirror_mismatches(&self) -> Result<Vec<MirrorMismatch>> {
        let db = self.db.lock().await;
        SqliteMirrorRepository::new(db.connection()).find_mismatches()
    }

    /// Load sync settings.
    pub async fn load_settings(&self) -> Result<SyncSettings> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).load()
    }

    /// Save sync settings.
    pub async fn save_settings(&self, settings: &SyncSettings) -> Result<()> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).save(settings)
    }

    /// Switch sync mode, recording the `NEW_ONLY` opt-in time once.
    pub async fn set_sync_mode(&self, mode: SyncMode, now: i64) -> Result<SyncSettings> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).set_sync_mode(mode, now)
    }

    /// Record completion of a full pass.
    pub async fn set_last_full_sync_at(&self, at: i64) -> Result<()> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).set_last_full_sync_at(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use tempfile::tempdir;

    #[tokio::test]
    async fn in_memory_merge_and_select_roundtrip() {
        let service = DatabaseService::open_in_memory().unwrap();

        service
            .merge_messages(&[LocalMessage::new(
                "1",
                1,
                "+15550100",
                100,
                Direction::Received,
                "hello core",
            )])
            .await
            .unwrap();
        let messages = service.select_eligible(None, 3, 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, "hello core");
        assert!(service.path().is_none());
    }

    #[tokio::test]
    async fn open_path_creates_parent_directories() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("ledger.db");

        let service = DatabaseService::open_path(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(service.path(), Some(&db_path));
        assert_eq!(service.stats(3).await.unwrap(), LedgerStats::default());
    }
}
