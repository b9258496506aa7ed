//! Database layer for Courier

mod connection;
mod migrations;
mod repository;
mod settings_repository;

pub use connection::Database;
pub use repository::{
    Delivery, FailedAttempt, LedgerRepository, MergeOutcome, MirrorRepository,
    SqliteLedgerRepository, SqliteMirrorRepository,
};
pub use settings_repository::{SettingsRepository, SqliteSettingsRepository};
