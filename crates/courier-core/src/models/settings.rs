//! Persistent sync settings model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which ledger messages are eligible for delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMode {
    /// Every unsent message regardless of age
    #[default]
    All,
    /// Only messages at or after the moment sync was opted into
    NewOnly,
}

impl SyncMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::NewOnly => "NEW_ONLY",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "ALL" => Ok(Self::All),
            "NEW_ONLY" => Ok(Self::NewOnly),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown sync mode '{other}'"
            ))),
        }
    }
}

/// Sync settings stored in the key-value settings table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncSettings {
    /// Administrative switch; a disabled engine never dispatches
    pub sync_enabled: bool,
    pub sync_mode: SyncMode,
    /// When `NEW_ONLY` was opted into (Unix ms)
    pub sync_enabled_since: Option<i64>,
    /// Remote channel receiving the messages
    pub destination_id: Option<String>,
    /// Completion time of the last full pass (Unix ms)
    pub last_full_sync_at: Option<i64>,
}

impl SyncSettings {
    /// Timestamp cutoff below which messages are never selected.
    ///
    /// `NEW_ONLY` without a recorded opt-in time selects nothing.
    pub fn watermark(&self) -> Option<i64> {
        match self.sync_mode {
            SyncMode::All => None,
            SyncMode::NewOnly => Some(self.sync_enabled_since.unwrap_or(i64::MAX)),
        }
    }

    /// Whether `timestamp` passes the watermark filter
    pub fn admits(&self, timestamp: i64) -> bool {
        self.watermark().is_none_or(|cutoff| timestamp >= cutoff)
    }
}
