//! Remote mirror model

use serde::{Deserialize, Serialize};

/// Confirmed delivery of a ledger message to the remote channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMirrorRecord {
    /// Identifier assigned by the channel
    pub remote_id: String,
    /// Ledger message this delivery came from
    pub origin_local_id: String,
    pub address: String,
    pub body: String,
    /// Origin event time (Unix ms)
    pub origin_timestamp: i64,
    /// Delivery time (Unix ms)
    pub synced_at: i64,
    /// Channel the message was delivered to
    pub destination_channel_id: String,
}

/// A break in the one-to-one correspondence between synced ledger rows and
/// mirror rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MirrorMismatch {
    /// Ledger says delivered but no mirror row carries its remote id
    MissingMirror {
        local_id: String,
        remote_id: Option<String>,
    },
    /// Mirror row without a synced ledger row behind it
    OrphanMirror {
        remote_id: String,
        origin_local_id: String,
    },
}
