use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] courier_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
    #[error("Bot token cannot be empty")]
    EmptyToken,
    #[error("Destination id cannot be empty")]
    EmptyDestination,
    #[error(
        "Origin store is not configured. Pass --origin-path, set COURIER_ORIGIN_PATH, or add origin_path to cli-config.json."
    )]
    OriginNotConfigured,
    #[error("Bot token is not configured. Run `courier token set` or set COURIER_BOT_TOKEN.")]
    TokenNotConfigured,
    #[error("Sync failed: {0}")]
    Sync(String),
    #[error("{0} ledger/mirror mismatch(es) found")]
    MirrorMismatch(usize),
}
