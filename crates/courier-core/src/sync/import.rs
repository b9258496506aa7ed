//! Pulling origin records into the ledger

use crate::error::Result;
use crate::models::{LocalMessage, SyncMode, SyncSettings};
use crate::services::DatabaseService;
use crate::source::{MessageSource, OriginProvider};

/// Full scan of the origin, bounded by the source's scan cap.
pub(crate) async fn import_all<P: OriginProvider>(
    db: &DatabaseService,
    source: &MessageSource<P>,
    settings: &SyncSettings,
) -> Result<usize> {
    let messages = source.read_all().await?;
    merge_admitted(db, settings, messages).await
}

/// Incremental read of records newer than what the ledger already holds.
///
/// Records sharing the newest ledger timestamp are re-read; merging them
/// again is harmless. An empty ledger falls back to the `NEW_ONLY` opt-in
/// time, then to a bounded full scan.
pub(crate) async fn import_recent<P: OriginProvider>(
    db: &DatabaseService,
    source: &MessageSource<P>,
    settings: &SyncSettings,
) -> Result<usize> {
    let since = match db.latest_timestamp().await? {
        Some(latest) => Some(latest.saturating_sub(1)),
        None if settings.sync_mode == SyncMode::NewOnly => settings
            .sync_enabled_since
            .map(|since| since.saturating_sub(1)),
        None => None,
    };

    let messages = match since {
        Some(since) => source.read_after(since).await?,
        None => source.read_all().await?,
    };
    merge_admitted(db, settings, messages).await
}

async fn merge_admitted(
    db: &DatabaseService,
    settings: &SyncSettings,
    messages: Vec<LocalMessage>,
) -> Result<usize> {
    let admitted: Vec<LocalMessage> = messages
        .into_iter()
        .filter(|message| settings.admits(message.timestamp))
        .collect();
    if admitted.is_empty() {
        return Ok(0);
    }

    let outcome = db.merge_messages(&admitted).await?;
    if outcome.inserted > 0 || outcome.refreshed > 0 {
        tracing::info!(
            inserted = outcome.inserted,
            refreshed = outcome.refreshed,
            "Imported origin records"
        );
    }
    Ok(outcome.inserted)
}
