use std::sync::Arc;
use std::time::Duration;

use courier_core::source::{MessageSource, SqliteOriginProvider};
use courier_core::sync::{
    ChangeWatcher, ChannelScheduler, PassKind, PassOptions, PassRequests, Scheduler, SyncResult,
};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::cli_config::RuntimeConfig;
use crate::commands::common::{build_engine, Engine};
use crate::error::CliError;

const MIN_FULL_SYNC_PERIOD: Duration = Duration::from_secs(60);

/// Relay new messages as they land in the origin until Ctrl-C.
pub async fn run_watch(runtime: &RuntimeConfig, poll_ms: u64) -> Result<(), CliError> {
    let (engine, source) = build_engine(runtime)?;
    let (scheduler, requests) = ChannelScheduler::new();
    let watcher = ChangeWatcher::new(
        engine.database().clone(),
        Arc::clone(&source),
        Arc::new(scheduler.clone()),
        runtime.engine.watcher,
    );
    let cancel = CancellationToken::new();
    let full_period = runtime.engine.full_sync_interval.max(MIN_FULL_SYNC_PERIOD);

    println!("Watching for new messages. Press Ctrl-C to stop.");
    tokio::join!(
        watcher.run(&cancel),
        poll_origin(&source, Duration::from_millis(poll_ms), &cancel),
        schedule_full_passes(&scheduler, full_period, &cancel),
        drive_passes(&engine, requests, &cancel),
        cancel_on_interrupt(&cancel),
    );
    println!("Stopped watching.");
    Ok(())
}

async fn poll_origin(
    source: &MessageSource<SqliteOriginProvider>,
    period: Duration,
    cancel: &CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(period) => {}
        }
        if let Err(error) = source.provider().poll_for_changes() {
            tracing::warn!(%error, "Failed to poll origin store");
        }
    }
}

async fn schedule_full_passes(
    scheduler: &ChannelScheduler,
    period: Duration,
    cancel: &CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => scheduler.run_now(PassKind::Full),
        }
    }
}

async fn drive_passes(
    engine: &Engine,
    mut requests: PassRequests,
    cancel: &CancellationToken,
) {
    loop {
        let kind = tokio::select! {
            () = cancel.cancelled() => break,
            kind = requests.recv() => match kind {
                Some(kind) => kind,
                None => break,
            },
        };

        let options = PassOptions {
            cancel: cancel.clone(),
            ..PassOptions::default()
        };
        match kind {
            PassKind::Full => match engine.run_full_sync(options).await {
                Ok(report) => println!("Full sync {report}"),
                Err(error) => tracing::error!(%error, "Full sync failed"),
            },
            PassKind::Quick => match engine.run_quick_sync(options).await {
                SyncResult::Success(0) => {}
                SyncResult::Success(sent) => println!("Relayed {sent} new message(s)"),
                SyncResult::NoDestination => {
                    tracing::warn!("Quick sync skipped: no destination configured");
                }
                SyncResult::Error(message) => tracing::warn!(%message, "Quick sync failed"),
            },
        }
    }
}

async fn cancel_on_interrupt(cancel: &CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(error) = result {
                tracing::error!(%error, "Failed to listen for Ctrl-C");
            }
            cancel.cancel();
        }
        () = cancel.cancelled() => {}
    }
}
