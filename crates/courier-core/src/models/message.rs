//! Ledger message model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::util::truncate_utf16;

/// Longest text a channel message may carry, in UTF-16 code units.
pub const MAX_OUTBOUND_UNITS: usize = 4096;

/// Which way the origin message travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Delivered to this device
    Received,
    /// Sent from this device
    Sent,
    /// Drafts, queued or failed outgoing messages
    #[default]
    Other,
}

impl Direction {
    /// Map an origin message type code (1 = inbox, 2 = sent) to a direction.
    pub const fn from_origin_kind(kind: i64) -> Self {
        match kind {
            1 => Self::Received,
            2 => Self::Sent,
            _ => Self::Other,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Sent => "sent",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(Self::Received),
            "sent" => Ok(Self::Sent),
            "other" => Ok(Self::Other),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown message direction '{other}'"
            ))),
        }
    }
}

/// One origin message plus its delivery state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalMessage {
    /// Origin-assigned identifier
    pub id: String,
    /// Conversation the message belongs to
    pub thread_id: i64,
    /// Counterparty address (phone number or short code)
    pub address: String,
    /// Origin event time (Unix ms)
    pub timestamp: i64,
    pub direction: Direction,
    pub body: String,
    /// Identifier assigned by the remote channel once delivered
    pub remote_id: Option<String>,
    pub is_synced: bool,
    /// Delivery time (Unix ms)
    pub synced_at: Option<i64>,
    /// Failed delivery attempts since the last reset
    pub sync_attempts: u32,
    /// Time of the last delivery attempt (Unix ms)
    pub last_sync_attempt: Option<i64>,
    pub last_sync_error: Option<String>,
}

impl LocalMessage {
    /// Create an unsynced message with empty delivery state
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        thread_id: i64,
        address: impl Into<String>,
        timestamp: i64,
        direction: Direction,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id,
            address: address.into(),
            timestamp,
            direction,
            body: body.into(),
            remote_id: None,
            is_synced: false,
            synced_at: None,
            sync_attempts: 0,
            last_sync_attempt: None,
            last_sync_error: None,
        }
    }

    /// Whether the message has exhausted its delivery attempts
    #[must_use]
    pub const fn is_dead_lettered(&self, max_attempts: u32) -> bool {
        !self.is_synced && self.sync_attempts >= max_attempts
    }

    /// Render the text delivered to the remote channel.
    ///
    /// The body is truncated so the whole text fits within
    /// [`MAX_OUTBOUND_UNITS`], counted the way bot APIs count length.
    #[must_use]
    pub fn outbound_text(&self) -> String {
        let label = match self.direction {
            Direction::Received => "📩 From",
            Direction::Sent => "📤 To",
            Direction::Other => "✉️ With",
        };
        let when = chrono::DateTime::from_timestamp_millis(self.timestamp).map_or_else(
            || self.timestamp.to_string(),
            |at| {
                at.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M")
                    .to_string()
            },
        );
        let header = format!("{label}: {}\n🕐 {when}\n\n", self.address);
        let budget = MAX_OUTBOUND_UNITS.saturating_sub(header.encode_utf16().count());
        format!("{header}{}", truncate_utf16(&self.body, budget))
    }
}

/// Aggregate counts over the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total: u64,
    pub synced: u64,
    /// Unsynced and still eligible for delivery attempts
    pub pending: u64,
    /// Unsynced with attempts exhausted
    pub dead_lettered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_maps_origin_kinds() {
        assert_eq!(Direction::from_origin_kind(1), Direction::Received);
        assert_eq!(Direction::from_origin_kind(2), Direction::Sent);
        assert_eq!(Direction::from_origin_kind(3), Direction::Other);
        assert_eq!(Direction::from_origin_kind(0), Direction::Other);
    }

    #[test]
    fn direction_parses_its_own_labels() {
        for direction in [Direction::Received, Direction::Sent, Direction::Other] {
            assert_eq!(direction.as_str().parse::<Direction>().unwrap(), direction);
        }
        assert!("inbox".parse::<Direction>().is_err());
    }

    #[test]
    fn new_message_has_empty_delivery_state() {
        let message = LocalMessage::new("1", 7, "+15550100", 100, Direction::Received, "hi");
        assert!(!message.is_synced);
        assert_eq!(message.remote_id, None);
        assert_eq!(message.sync_attempts, 0);
        assert!(!message.is_dead_lettered(3));
    }

    #[test]
    fn dead_letter_requires_exhausted_attempts() {
        let mut message = LocalMessage::new("1", 7, "+15550100", 100, Direction::Received, "hi");
        message.sync_attempts = 3;
        assert!(message.is_dead_lettered(3));
        message.is_synced = true;
        assert!(!message.is_dead_lettered(3));
    }

    #[test]
    fn outbound_text_includes_address_and_body() {
        let message = LocalMessage::new("1", 7, "+15550100", 100, Direction::Received, "hi");
        let text = message.outbound_text();
        assert!(text.starts_with("📩 From: +15550100"));
        assert!(text.ends_with("hi"));
    }

    #[test]
    fn outbound_text_fits_channel_limit() {
        let body = "x".repeat(MAX_OUTBOUND_UNITS * 2);
        let message = LocalMessage::new("1", 7, "+15550100", 100, Direction::Sent, body);
        let text = message.outbound_text();
        assert_eq!(text.encode_utf16().count(), MAX_OUTBOUND_UNITS);
        assert!(text.starts_with("📤 To"));
    }

    #[test]
    fn outbound_text_counts_emoji_as_two_units() {
        let body = "😀".repeat(MAX_OUTBOUND_UNITS);
        let message = LocalMessage::new("1", 7, "+15550100", 100, Direction::Received, body);
        let text = message.outbound_text();
        assert!(text.encode_utf16().count() <= MAX_OUTBOUND_UNITS);
        assert!(text.chars().count() < MAX_OUTBOUND_UNITS);
        assert!(text.ends_with("😀…"));
    }
}
