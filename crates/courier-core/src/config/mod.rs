//! Engine tunables.
//!
//! `EngineConfig` carries every pacing and selection constant the sync engine
//! uses. Hosts start from the defaults and may layer a JSON document of
//! overrides on top (see [`EngineConfigOverrides`]).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What to do with errors that will not succeed on retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermanentErrorPolicy {
    /// Count the failure like any other until the attempt cap
    #[default]
    RetryUntilCap,
    /// Jump straight to the attempt cap
    DeadLetterImmediately,
}

/// Rate limiter pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Minimum spacing between two outbound calls
    pub min_interval: Duration,
    /// Added to a server-declared retry-after
    pub retry_buffer: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            retry_buffer: Duration::from_secs(5),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
        }
    }
}

/// Change watcher timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
    pub debounce_window: Duration,
    pub settle_delay: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(300),
            settle_delay: Duration::from_millis(200),
        }
    }
}

/// Sync engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_attempts: u32,
    /// Messages selected per full pass
    pub full_sync_limit: usize,
    pub batch_size: usize,
    pub quick_batch_size: usize,
    /// Bound on a full origin scan
    pub initial_scan_cap: usize,
    pub inter_message_delay: Duration,
    /// Successes between burst pauses
    pub burst_size: u32,
    pub burst_cooldown: Duration,
    /// Unforced full passes closer together than this are skipped
    pub full_sync_interval: Duration,
    pub send_timeout: Duration,
    pub permanent_error_policy: PermanentErrorPolicy,
    pub rate_limit: RateLimitConfig,
    pub watcher: WatcherConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            full_sync_limit: 100,
            batch_size: 10,
            quick_batch_size: 10,
            initial_scan_cap: 500,
            inter_message_delay: Duration::from_millis(1150),
            burst_size: 20,
            burst_cooldown: Duration::from_secs(25),
            full_sync_interval: Duration::from_secs(6 * 60 * 60),
            send_timeout: Duration::from_secs(30),
            permanent_error_policy: PermanentErrorPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            watcher: WatcherConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse overrides from JSON and apply them over the defaults.
    pub fn from_json(payload: &str) -> Result<Self> {
        let overrides: EngineConfigOverrides = serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid engine config JSON: {error}")))?;
        Self::default().with_overrides(&overrides)
    }

    /// Apply overrides and validate the result.
    pub fn with_overrides(mut self, overrides: &EngineConfigOverrides) -> Result<Self> {
        let ms = Duration::from_millis;

        if let Some(value) = overrides.max_attempts {
            self.max_attempts = value;
        }
        if let Some(value) = overrides.full_sync_limit {
            self.full_sync_limit = value;
        }
        if let Some(value) = overrides.batch_size {
            self.batch_size = value;
        }
        if let Some(value) = overrides.quick_batch_size {
            self.quick_batch_size = value;
        }
        if let Some(value) = overrides.initial_scan_cap {
            self.initial_scan_cap = value;
        }
        if let Some(value) = overrides.inter_message_delay_ms {
            self.inter_message_delay = ms(value);
        }
        if let Some(value) = overrides.burst_size {
            self.burst_size = value;
        }
        if let Some(value) = overrides.burst_cooldown_ms {
            self.burst_cooldown = ms(value);
        }
        if let Some(value) = overrides.full_sync_interval_ms {
            self.full_sync_interval = ms(value);
        }
        if let Some(value) = overrides.send_timeout_ms {
            self.send_timeout = ms(value);
        }
        if let Some(value) = overrides.permanent_error_policy {
            self.permanent_error_policy = value;
        }
        if let Some(value) = overrides.min_interval_ms {
            self.rate_limit.min_interval = ms(value);
        }
        if let Some(value) = overrides.retry_buffer_ms {
            self.rate_limit.retry_buffer = ms(value);
        }
        if let Some(value) = overrides.backoff_base_ms {
            self.rate_limit.backoff_base = ms(value);
        }
        if let Some(value) = overrides.backoff_cap_ms {
            self.rate_limit.backoff_cap = ms(value);
        }
        if let Some(value) = overrides.debounce_window_ms {
            self.watcher.debounce_window = ms(value);
        }
        if let Some(value) = overrides.settle_delay_ms {
            self.watcher.settle_delay = ms(value);
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        if self.batch_size == 0 || self.quick_batch_size == 0 {
            return Err(Error::Config("batch sizes must be at least 1".to_string()));
        }
        if self.send_timeout.is_zero() {
            return Err(Error::Config("send_timeout must be positive".to_string()));
        }
        if self.rate_limit.backoff_cap < self.rate_limit.backoff_base {
            return Err(Error::Config(
                "backoff_cap must not be below backoff_base".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial engine configuration as stored in JSON. Durations are milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfigOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_sync_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_scan_cap: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inter_message_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_cooldown_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_sync_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permanent_error_policy: Option<PermanentErrorPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_buffer_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_base_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_cap_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_window_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_delay_ms: Option<u64>,
}
