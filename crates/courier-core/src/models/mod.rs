//! Data models for Courier

mod message;
mod mirror;
mod settings;

pub use message::{Direction, LedgerStats, LocalMessage, MAX_OUTBOUND_UNITS};
pub use mirror::{MirrorMismatch, RemoteMirrorRecord};
pub use settings::{SyncMode, SyncSettings};
