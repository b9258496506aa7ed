//! courier-core - Core library for Courier
//!
//! Courier relays the messages of a device's local message store to a remote
//! chat channel. This crate holds the ledger and mirror persistence, the
//! origin readers, the channel client, and the sync engine used by the CLI
//! and by embedding hosts.

pub mod channel;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod source;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{LocalMessage, RemoteMirrorRecord, SyncMode, SyncSettings};
