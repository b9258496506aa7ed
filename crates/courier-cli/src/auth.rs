//! Bot token storage in the OS keychain.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;

use courier_core::util::normalize_text_option;

use crate::cli_config::ENV_BOT_TOKEN;
use crate::error::CliError;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "courier-cli";
const KEYRING_USERNAME: &str = "bot_token";

/// Where the active bot token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Environment,
    Keychain,
}

impl TokenSource {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::Keychain => "keychain",
        }
    }
}

pub struct TokenStore {
    username: String,
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            username: KEYRING_USERNAME.to_string(),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> Result<Entry, CliError> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| CliError::SecureStorage(error.to_string()))
    }

    #[cfg(not(test))]
    pub fn load(&self) -> Result<Option<String>, CliError> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(normalize_text_option(Some(token))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(CliError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    pub fn load(&self) -> Result<Option<String>, CliError> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::SecureStorage(error.to_string()))?;
        Ok(guard.get(&self.username).cloned())
    }

    #[cfg(not(test))]
    pub fn save(&self, token: &str) -> Result<(), CliError> {
        let token = normalize_token(token)?;
        self.entry()?
            .set_password(&token)
            .map_err(|error| CliError::SecureStorage(error.to_string()))
    }

    #[cfg(test)]
    pub fn save(&self, token: &str) -> Result<(), CliError> {
        let token = normalize_token(token)?;
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::SecureStorage(error.to_string()))?;
        guard.insert(self.username.clone(), token);
        Ok(())
    }

    #[cfg(not(test))]
    pub fn clear(&self) -> Result<(), CliError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(CliError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    pub fn clear(&self) -> Result<(), CliError> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| CliError::SecureStorage(error.to_string()))?;
        guard.remove(&self.username);
        Ok(())
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_token(token: &str) -> Result<String, CliError> {
    normalize_text_option(Some(token.to_string())).ok_or(CliError::EmptyToken)
}

/// Resolve the bot token, preferring the environment over the keychain.
pub fn resolve_token(store: &TokenStore) -> Result<Option<(String, TokenSource)>, CliError> {
    resolve_token_from(std::env::var(ENV_BOT_TOKEN).ok(), store)
}

pub fn resolve_token_from(
    env_token: Option<String>,
    store: &TokenStore,
) -> Result<Option<(String, TokenSource)>, CliError> {
    if let Some(token) = normalize_text_option(env_token) {
        return Ok(Some((token, TokenSource::Environment)));
    }
    Ok(store.load()?.map(|token| (token, TokenSource::Keychain)))
}

pub fn require_token(store: &TokenStore) -> Result<String, CliError> {
    resolve_token(store)?
        .map(|(token, _)| token)
        .ok_or(CliError::TokenNotConfigured)
}
