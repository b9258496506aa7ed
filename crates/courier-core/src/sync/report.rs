//! Outcomes of sync passes

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a pass stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    NoDestinationConfigured,
    RateLimited,
    Cancelled,
}

/// Terminal state of a full pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum PassOutcome {
    /// Sync is turned off; nothing was touched
    Disabled,
    Completed,
    Aborted(AbortReason),
}

/// Counters and outcome of one full pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub outcome: PassOutcome,
    /// Ledger rows created from the origin during this pass
    pub imported: usize,
    pub succeeded: usize,
    /// Sends started, successful or not
    pub attempted: usize,
    pub failed: usize,
    pub burst_pauses: usize,
    /// The pass was skipped because the last full pass is recent
    pub skipped_recent: bool,
    pub error_message: Option<String>,
}

impl SyncReport {
    #[must_use]
    pub const fn new(outcome: PassOutcome) -> Self {
        Self {
            outcome,
            imported: 0,
            succeeded: 0,
            attempted: 0,
            failed: 0,
            burst_pauses: 0,
            skipped_recent: false,
            error_message: None,
        }
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.outcome, PassOutcome::Completed)
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.outcome {
            PassOutcome::Disabled => return f.write_str("sync disabled"),
            PassOutcome::Completed if self.skipped_recent => {
                return f.write_str("skipped: last full sync is recent");
            }
            PassOutcome::Completed => f.write_str("completed")?,
            PassOutcome::Aborted(AbortReason::NoDestinationConfigured) => {
                return f.write_str("aborted: no destination configured");
            }
            PassOutcome::Aborted(AbortReason::RateLimited) => f.write_str("aborted: rate limited")?,
            PassOutcome::Aborted(AbortReason::Cancelled) => f.write_str("aborted: cancelled")?,
        }
        write!(
            f,
            " (imported {}, sent {}/{}, failed {}, burst pauses {})",
            self.imported, self.succeeded, self.attempted, self.failed, self.burst_pauses
        )
    }
}

/// Result of a quick pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "value", rename_all = "snake_case")]
pub enum SyncResult {
    /// Messages delivered
    Success(usize),
    Error(String),
    NoDestination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_summarises_counters() {
        let report = SyncReport {
            imported: 4,
            succeeded: 2,
            attempted: 3,
            failed: 1,
            ..SyncReport::new(PassOutcome::Aborted(AbortReason::RateLimited))
        };
        assert_eq!(
            report.to_string(),
            "aborted: rate limited (imported 4, sent 2/3, failed 1, burst pauses 0)"
        );
        assert_eq!(
            SyncReport::new(PassOutcome::Disabled).to_string(),
            "sync disabled"
        );
    }

    #[test]
    fn outcome_serializes_with_reason() {
        let json =
            serde_json::to_value(PassOutcome::Aborted(AbortReason::NoDestinationConfigured))
                .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "state": "aborted", "reason": "no_destination_configured" })
        );
        let json = serde_json::to_value(SyncResult::Success(3)).unwrap();
        assert_eq!(json, serde_json::json!({ "result": "success", "value": 3 }));
    }
}
