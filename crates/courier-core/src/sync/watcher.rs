//! Origin change watcher feeding quick passes

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::debounce::Debouncer;
use super::import::import_recent;
use super::scheduler::{PassKind, Scheduler};
use crate::config::WatcherConfig;
use crate::error::Result;
use crate::services::DatabaseService;
use crate::source::{MessageSource, OriginProvider};

/// Imports new origin records shortly after they appear and asks the
/// scheduler for a quick pass when something new arrived.
pub struct ChangeWatcher<P> {
    db: DatabaseService,
    source: Arc<MessageSource<P>>,
    scheduler: Arc<dyn Scheduler>,
    config: WatcherConfig,
}

impl<P: OriginProvider> ChangeWatcher<P> {
    pub fn new(
        db: DatabaseService,
        source: Arc<MessageSource<P>>,
        scheduler: Arc<dyn Scheduler>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            db,
            source,
            scheduler,
            config,
        }
    }

    /// Watch until cancelled or the change stream closes.
    pub async fn run(&self, cancel: &CancellationToken) {
        let mut changes = self.source.subscribe();
        let mut debouncer = Debouncer::new(self.config.debounce_window);
        let mut settle_at: Option<Instant> = None;
        tracing::info!("Watching origin for changes");

        loop {
            let deadline = settle_at;
            let settled = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                () = cancel.cancelled() => break,
                event = changes.recv() => match event {
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        let now = Instant::now();
                        if debouncer.on_event(now) {
                            settle_at = Some(now + self.config.settle_delay);
                        } else if settle_at.is_none() {
                            // Dropped after the last import ran
                            settle_at = debouncer.window_end();
                        }
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("Origin change stream closed");
                        break;
                    }
                },
                () = settled => {
                    settle_at = None;
                    if let Err(error) = self.on_settled().await {
                        tracing::warn!("Failed to import origin changes: {error}");
                    }
                }
            }
        }
        tracing::info!("Stopped watching origin");
    }

    async fn on_settled(&self) -> Result<()> {
        let settings = self.db.load_settings().await?;
        if !settings.sync_enabled {
            return Ok(());
        }

        let inserted = import_recent(&self.db, &self.source, &settings).await?;
        if inserted > 0 {
            tracing::debug!(inserted, "New origin records, requesting quick pass");
            self.scheduler.run_now(PassKind::Quick);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncSettings;
    use crate::source::{MemoryOriginProvider, OriginRecord};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingScheduler {
        requests: Mutex<Vec<PassKind>>,
    }

    impl Scheduler for RecordingScheduler {
        fn run_now(&self, kind: PassKind) {
            self.requests.lock().unwrap().push(kind);
        }
    }

    impl RecordingScheduler {
        fn count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    fn record(id: &str, timestamp: i64) -> OriginRecord {
        OriginRecord {
            id: id.to_string(),
            thread_id: 1,
            address: "+15550100".to_string(),
            timestamp,
            kind: 1,
            body: format!("body {id}"),
        }
    }

    async fn setup() -> (
        ChangeWatcher<MemoryOriginProvider>,
        Arc<MessageSource<MemoryOriginProvider>>,
        Arc<RecordingScheduler>,
        DatabaseService,
    ) {
        let db = DatabaseService::open_in_memory().unwrap();
        db.save_settings(&SyncSettings {
            sync_enabled: true,
            destination_id: Some("-1001".to_string()),
            ..SyncSettings::default()
        })
        .await
        .unwrap();
        let source = Arc::new(MessageSource::new(MemoryOriginProvider::new()));
        let scheduler = Arc::new(RecordingScheduler::default());
        let watcher = ChangeWatcher::new(
            db.clone(),
            Arc::clone(&source),
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
            WatcherConfig::default(),
        );
        (watcher, source, scheduler, db)
    }

    #[tokio::test(start_paused = true)]
    async fn imports_after_settle_delay_and_requests_quick_pass() {
        let (watcher, source, scheduler, db) = setup().await;
        let cancel = CancellationToken::new();

        tokio::join!(watcher.run(&cancel), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            source.provider().push(record("1", 100));

            tokio::time::sleep(Duration::from_millis(150)).await;
            assert_eq!(scheduler.count(), 0);

            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(scheduler.count(), 1);
            cancel.cancel();
        });

        assert_eq!(
            scheduler.requests.lock().unwrap().as_slice(),
            &[PassKind::Quick]
        );
        assert!(db.get_message("1").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn events_inside_debounce_window_are_coalesced() {
        let (watcher, source, scheduler, db) = setup().await;
        let cancel = CancellationToken::new();

        tokio::join!(watcher.run(&cancel), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            source.provider().push(record("1", 100));
            tokio::time::sleep(Duration::from_millis(100)).await;
            source.provider().push(record("2", 200));

            tokio::time::sleep(Duration::from_secs(1)).await;
            assert_eq!(scheduler.count(), 1);

            source.provider().push(record("3", 300));
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        assert_eq!(scheduler.count(), 2);
        assert_eq!(db.stats(3).await.unwrap().total, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_records_do_not_trigger_a_pass() {
        let (watcher, source, scheduler, _db) = setup().await;
        let cancel = CancellationToken::new();

        tokio::join!(watcher.run(&cancel), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            source.provider().push(record("1", 100));
            tokio::time::sleep(Duration::from_secs(1)).await;

            source.provider().push(record("1", 100));
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        assert_eq!(scheduler.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_sync_imports_nothing() {
        let (watcher, source, scheduler, db) = setup().await;
        let mut settings = db.load_settings().await.unwrap();
        settings.sync_enabled = false;
        db.save_settings(&settings).await.unwrap();
        let cancel = CancellationToken::new();

        tokio::join!(watcher.run(&cancel), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            source.provider().push(record("1", 100));
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        assert_eq!(scheduler.count(), 0);
        assert_eq!(db.stats(3).await.unwrap().total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn event_dropped_after_import_is_picked_up_when_window_closes() {
        let (watcher, source, scheduler, db) = setup().await;
        let cancel = CancellationToken::new();

        tokio::join!(watcher.run(&cancel), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            source.provider().push(record("1", 100));

            // Imported at 210ms; the debounce window stays open until 310ms
            tokio::time::sleep(Duration::from_millis(240)).await;
            assert_eq!(scheduler.count(), 1);
            source.provider().push(record("2", 200));

            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(scheduler.count(), 2);
            cancel.cancel();
        });

        assert!(db.get_message("2").await.unwrap().is_some());
    }
}
