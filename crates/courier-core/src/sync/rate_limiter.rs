//! Per-destination outbound pacing

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::classify::{classify, retry_after_hint, ErrorKind};
use crate::config::RateLimitConfig;

/// Gatekeeper around every outbound call to one destination.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    last_call_at: Option<Instant>,
    consecutive_errors: u32,
    rate_limited_until: Option<Instant>,
    /// Whether the active window was declared by a rate-limit error
    window_from_rate_limit: bool,
}

impl RateLimiter {
    #[must_use]
    pub const fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            last_call_at: None,
            consecutive_errors: 0,
            rate_limited_until: None,
            window_from_rate_limit: false,
        }
    }

    /// How long a call at `now` would have to wait.
    #[must_use]
    pub fn permit_delay(&self, now: Instant) -> Duration {
        let window = self
            .rate_limited_until
            .map_or(Duration::ZERO, |until| until.saturating_duration_since(now));
        let spacing = self.last_call_at.map_or(Duration::ZERO, |last| {
            (last + self.config.min_interval).saturating_duration_since(now)
        });
        window.max(spacing)
    }

    /// Wait until a call is allowed, then record it.
    ///
    /// Returns `false` if cancelled while waiting.
    pub async fn wait_for_permission(&mut self, cancel: &CancellationToken) -> bool {
        loop {
            let delay = self.permit_delay(Instant::now());
            if delay.is_zero() {
                break;
            }
            tracing::debug!(wait_ms = delay.as_millis(), "Waiting for rate limiter");
            tokio::select! {
                biased;
                () = cancel.cancelled() => return false,
                () = tokio::time::sleep(delay) => {}
            }
        }
        self.last_call_at = Some(Instant::now());
        true
    }

    pub fn on_success(&mut self) {
        self.consecutive_errors = 0;
        self.rate_limited_until = None;
        self.window_from_rate_limit = false;
    }

    /// Open a cool-down window for a failed call and classify it.
    pub fn on_error(&mut self, raw: &str) -> ErrorKind {
        let kind = classify(raw);
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);

        let window = match retry_after_hint(raw) {
            Some(hint) => hint + self.config.retry_buffer,
            None => self.backoff(),
        };
        self.rate_limited_until = Some(Instant::now() + window);
        self.window_from_rate_limit = kind == ErrorKind::RateLimited;

        tracing::debug!(
            kind = %kind,
            consecutive_errors = self.consecutive_errors,
            wait_ms = window.as_millis(),
            "Rate limiter cooling down"
        );
        kind
    }

    /// Remaining rate-limit cool-down, if the destination is inside one.
    #[must_use]
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        if !self.window_from_rate_limit {
            return None;
        }
        self.rate_limited_until
            .map(|until| until.saturating_duration_since(Instant::now()))
            .filter(|remaining| !remaining.is_zero())
    }

    #[must_use]
    pub const fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    fn backoff(&self) -> Duration {
        let exponent = self.consecutive_errors.saturating_sub(1).min(16);
        self.config
            .backoff_base
            .saturating_mul(2_u32.pow(exponent))
            .min(self.config.backoff_cap)
    }
}
