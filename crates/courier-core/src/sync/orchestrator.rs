//! Sync passes: selection, dispatch, and bookkeeping.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::burst::BurstTracker;
use super::classify::ErrorKind;
use super::clock::Clock;
use super::import::{import_all, import_recent};
use super::rate_limiter::RateLimiter;
use super::report::{AbortReason, PassOutcome, SyncReport, SyncResult};
use crate::channel::{ChannelClient, ChannelError};
use crate::config::{EngineConfig, PermanentErrorPolicy};
use crate::db::{Delivery, FailedAttempt};
use crate::error::Result;
use crate::models::{LocalMessage, SyncSettings};
use crate::services::DatabaseService;
use crate::source::{MessageSource, OriginProvider};
use crate::util::truncate_chars;

/// Stored error texts are kept up to this many characters.
const MAX_ERROR_CHARS: usize = 500;

/// Caller-supplied knobs for one pass.
#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    /// Overrides the configured destination
    pub destination: Option<String>,
    /// Ignore the full sync interval
    pub force: bool,
    pub cancel: CancellationToken,
}

impl PassOptions {
    #[must_use]
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }
}

/// Pacing state that outlives a single pass.
#[derive(Debug)]
struct DestinationState {
    limiter: RateLimiter,
    burst: BurstTracker,
}

impl DestinationState {
    const fn new(config: &EngineConfig) -> Self {
        Self {
            limiter: RateLimiter::new(config.rate_limit),
            burst: BurstTracker::new(config.burst_size, config.burst_cooldown),
        }
    }
}

/// Progress carried across the batches of one pass.
struct Dispatch<'a> {
    destination: &'a str,
    cancel: &'a CancellationToken,
    sent_any: bool,
    report: SyncReport,
}

/// Drives sync passes from the ledger to one or more destinations.
///
/// Passes to the same destination never overlap: each holds that
/// destination's pacing state for its whole duration.
pub struct SyncOrchestrator<C, P> {
    db: DatabaseService,
    source: Arc<MessageSource<P>>,
    client: C,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    destinations: std::sync::Mutex<HashMap<String, Arc<Mutex<DestinationState>>>>,
}

impl<C: ChannelClient, P: OriginProvider> SyncOrchestrator<C, P> {
    pub fn new(
        db: DatabaseService,
        source: Arc<MessageSource<P>>,
        client: C,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            source,
            client,
            clock,
            config,
            destinations: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub const fn database(&self) -> &DatabaseService {
        &self.db
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Full pass: import, select up to the full sync limit, dispatch in batches.
    pub async fn run_full_sync(&self, options: PassOptions) -> Result<SyncReport> {
        let settings = self.db.load_settings().await?;
        if !settings.sync_enabled {
            tracing::debug!("Sync disabled, skipping full pass");
            return Ok(SyncReport::new(PassOutcome::Disabled));
        }
        let Some(destination) = resolve_destination(options.destination.as_deref(), &settings)
        else {
            tracing::warn!("No destination configured, aborting full pass");
            return Ok(no_destination_report());
        };

        let state = self.destination_state(&destination);
        let mut state = state.lock().await;

        // Another pass may have finished while this one waited for the lock
        let settings = self.db.load_settings().await?;
        if !options.force && self.is_recent(settings.last_full_sync_at) {
            tracing::debug!(destination = %destination, "Last full pass is recent, skipping");
            let mut report = SyncReport::new(PassOutcome::Completed);
            report.skipped_recent = true;
            return Ok(report);
        }

        tracing::info!(destination = %destination, "Starting full pass");
        let repaired = self.db.repair_from_mirror().await?;
        if repaired > 0 {
            tracing::warn!(repaired, "Restored delivery state from the mirror");
        }

        let imported = import_all(&self.db, &self.source, &settings).await?;
        let eligible = self
            .db
            .select_eligible(
                settings.watermark(),
                self.config.max_attempts,
                self.config.full_sync_limit,
            )
            .await?;

        let mut dispatch = Dispatch {
            destination: &destination,
            cancel: &options.cancel,
            sent_any: false,
            report: SyncReport::new(PassOutcome::Completed),
        };
        dispatch.report.imported = imported;

        for batch in eligible.chunks(self.config.batch_size) {
            if let Some(reason) = self.dispatch_batch(batch, &mut state, &mut dispatch).await? {
                dispatch.report.outcome = PassOutcome::Aborted(reason);
                break;
            }
        }

        let report = dispatch.report;
        if matches!(
            report.outcome,
            PassOutcome::Completed | PassOutcome::Aborted(AbortReason::Cancelled)
        ) {
            self.db.set_last_full_sync_at(self.clock.now_millis()).await?;
        }

        tracing::info!(
            destination = %destination,
            outcome = ?report.outcome,
            imported = report.imported,
            succeeded = report.succeeded,
            attempted = report.attempted,
            failed = report.failed,
            burst_pauses = report.burst_pauses,
            "Full pass finished"
        );
        Ok(report)
    }

    /// Quick pass: incremental import and a single batch.
    ///
    /// Fails fast instead of waiting when the destination is cooling down
    /// after a rate limit.
    pub async fn run_quick_sync(&self, options: PassOptions) -> SyncResult {
        match self.quick_pass(options).await {
            Ok(result) => result,
            Err(error) => {
                tracing::error!("Quick pass failed: {error}");
                SyncResult::Error(error.to_string())
            }
        }
    }

    async fn quick_pass(&self, options: PassOptions) -> Result<SyncResult> {
        let settings = self.db.load_settings().await?;
        if !settings.sync_enabled {
            return Ok(SyncResult::Success(0));
        }
        let Some(destination) = resolve_destination(options.destination.as_deref(), &settings)
        else {
            return Ok(SyncResult::NoDestination);
        };

        let state = self.destination_state(&destination);
        let mut state = state.lock().await;

        if let Some(remaining) = state.limiter.cooldown_remaining() {
            tracing::info!(
                destination = %destination,
                wait_ms = remaining.as_millis(),
                "Destination is rate limited, skipping quick pass"
            );
            return Ok(SyncResult::Error(format!(
                "rate limited for another {}s",
                remaining.as_secs().max(1)
            )));
        }

        import_recent(&self.db, &self.source, &settings).await?;
        let eligible = self
            .db
            .select_eligible(
                settings.watermark(),
                self.config.max_attempts,
                self.config.quick_batch_size,
            )
            .await?;

        let mut dispatch = Dispatch {
            destination: &destination,
            cancel: &options.cancel,
            sent_any: false,
            report: SyncReport::new(PassOutcome::Completed),
        };
        let abort = self.dispatch_batch(&eligible, &mut state, &mut dispatch).await?;
        let report = dispatch.report;
        tracing::debug!(
            destination = %destination,
            succeeded = report.succeeded,
            attempted = report.attempted,
            "Quick pass finished"
        );

        Ok(match abort {
            None => SyncResult::Success(report.succeeded),
            Some(AbortReason::RateLimited) => SyncResult::Error(
                report
                    .error_message
                    .unwrap_or_else(|| "rate limited".to_string()),
            ),
            Some(AbortReason::Cancelled) => SyncResult::Error(format!(
                "cancelled after {} sent",
                report.succeeded
            )),
            Some(AbortReason::NoDestinationConfigured) => SyncResult::NoDestination,
        })
    }

    /// Deliver one batch sequentially, writing failures once at the end.
    async fn dispatch_batch(
        &self,
        batch: &[LocalMessage],
        state: &mut DestinationState,
        dispatch: &mut Dispatch<'_>,
    ) -> Result<Option<AbortReason>> {
        let mut failures = Vec::new();
        let mut abort = None;

        for message in batch {
            if dispatch.cancel.is_cancelled() {
                abort = Some(AbortReason::Cancelled);
                break;
            }

            if let Some(pause) = state.burst.pending_pause(Instant::now()) {
                dispatch.report.burst_pauses += 1;
                tracing::info!(
                    destination = dispatch.destination,
                    wait_ms = pause.as_millis(),
                    "Burst limit reached, pausing"
                );
                let cancelled = tokio::select! {
                    biased;
                    () = dispatch.cancel.cancelled() => true,
                    () = tokio::time::sleep(pause) => false,
                };
                if cancelled {
                    abort = Some(AbortReason::Cancelled);
                    break;
                }
                state.burst.clear_pause();
            }

            if dispatch.sent_any && !self.config.inter_message_delay.is_zero() {
                let cancelled = tokio::select! {
                    biased;
                    () = dispatch.cancel.cancelled() => true,
                    () = tokio::time::sleep(self.config.inter_message_delay) => false,
                };
                if cancelled {
                    abort = Some(AbortReason::Cancelled);
                    break;
                }
            }

            if !state.limiter.wait_for_permission(dispatch.cancel).await {
                abort = Some(AbortReason::Cancelled);
                break;
            }

            dispatch.sent_any = true;
            dispatch.report.attempted += 1;

            match self.send(dispatch.destination, message).await {
                Ok(remote_id) => {
                    state.limiter.on_success();
                    let delivery = Delivery {
                        local_id: message.id.clone(),
                        remote_id,
                        destination: dispatch.destination.to_string(),
                        synced_at: self.clock.now_millis(),
                    };
                    // The channel counts the send whether or not the ledger write lands
                    state.burst.record_success(Instant::now());
                    match self.db.mark_synced(&delivery).await {
                        Ok(_) => {
                            tracing::debug!(
                                destination = dispatch.destination,
                                message_id = %message.id,
                                remote_id = %delivery.remote_id,
                                "Delivered message"
                            );
                            dispatch.report.succeeded += 1;
                        }
                        Err(error) => {
                            // Re-sending would duplicate the remote copy
                            let error = format!(
                                "delivered as {} but not recorded: {error}",
                                delivery.remote_id
                            );
                            tracing::error!(
                                destination = dispatch.destination,
                                message_id = %message.id,
                                "{error}"
                            );
                            dispatch.report.failed += 1;
                            dispatch.report.error_message = Some(error.clone());
                            failures.push(FailedAttempt {
                                local_id: message.id.clone(),
                                error: truncate_chars(&error, MAX_ERROR_CHARS),
                                attempted_at: delivery.synced_at,
                                dead_letter: true,
                            });
                        }
                    }
                }
                Err(error) => {
                    let kind = state.limiter.on_error(&error.0);
                    tracing::warn!(
                        destination = dispatch.destination,
                        message_id = %message.id,
                        kind = %kind,
                        "Delivery failed: {error}"
                    );
                    dispatch.report.failed += 1;
                    dispatch.report.error_message = Some(error.0.clone());
                    failures.push(FailedAttempt {
                        local_id: message.id.clone(),
                        error: truncate_chars(&error.0, MAX_ERROR_CHARS),
                        attempted_at: self.clock.now_millis(),
                        dead_letter: self.config.permanent_error_policy
                            == PermanentErrorPolicy::DeadLetterImmediately
                            && kind.is_permanent(),
                    });

                    if kind == ErrorKind::RateLimited {
                        abort = Some(AbortReason::RateLimited);
                        break;
                    }
                }
            }
        }

        self.flush_failures(&failures).await?;
        Ok(abort)
    }

    async fn send(
        &self,
        destination: &str,
        message: &LocalMessage,
    ) -> std::result::Result<String, ChannelError> {
        let text = message.outbound_text();
        match tokio::time::timeout(
            self.config.send_timeout,
            self.client.send_message(destination, &text),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ChannelError(format!(
                "timeout: no response within {}ms",
                self.config.send_timeout.as_millis()
            ))),
        }
    }

    async fn flush_failures(&self, failures: &[FailedAttempt]) -> Result<()> {
        if failures.is_empty() {
            return Ok(());
        }
        self.db
            .record_failures(failures, self.config.max_attempts)
            .await
    }

    fn destination_state(&self, destination: &str) -> Arc<Mutex<DestinationState>> {
        let mut destinations = self
            .destinations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            destinations
                .entry(destination.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(DestinationState::new(&self.config)))),
        )
    }

    fn is_recent(&self, last_full_sync_at: Option<i64>) -> bool {
        let Some(last) = last_full_sync_at else {
            return false;
        };
        let interval = i64::try_from(self.config.full_sync_interval.as_millis()).unwrap_or(i64::MAX);
        let elapsed = self.clock.now_millis().saturating_sub(last);
        (0..interval).contains(&elapsed)
    }
}

fn resolve_destination(explicit: Option<&str>, settings: &SyncSettings) -> Option<String> {
    crate::util::normalize_text_option(explicit.map(str::to_string))
        .or_else(|| settings.destination_id.clone())
}

fn no_destination_report() -> SyncReport {
    let mut report = SyncReport::new(PassOutcome::Aborted(AbortReason::NoDestinationConfigured));
    report.error_message = Some("No destination configured".to_string());
    report
}
