//! Persistent CLI configuration and runtime resolution.

use std::env;
use std::path::{Path, PathBuf};

use courier_core::channel::DEFAULT_API_BASE_URL;
use courier_core::config::{EngineConfig, EngineConfigOverrides};
use courier_core::util::{is_http_url, normalize_text_option};
use serde::{Deserialize, Serialize};

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "cli-config.json";
const APP_DIR_NAME: &str = "courier";
const LEDGER_FILE_NAME: &str = "ledger.db";

pub const ENV_DB_PATH: &str = "COURIER_DB_PATH";
pub const ENV_ORIGIN_PATH: &str = "COURIER_ORIGIN_PATH";
pub const ENV_API_BASE_URL: &str = "COURIER_API_BASE_URL";
pub const ENV_BOT_TOKEN: &str = "COURIER_BOT_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub origin_path: Option<PathBuf>,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub engine: EngineConfigOverrides,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI config directory".to_string()))
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(LEDGER_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

impl CliConfig {
    pub fn load() -> Result<Self, CliError> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            CliError::Config(format!(
                "Failed to read config at {}: {}",
                path.display(),
                error
            ))
        })?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            CliError::Config(format!(
                "Failed to parse config at {}: {}",
                path.display(),
                error
            ))
        })?;
        config.normalize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), CliError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    fn normalize(&mut self) {
        self.api_base_url = normalize_text_option(self.api_base_url.clone())
            .map(|url| url.trim_end_matches('/').to_string());
    }
}

/// Values a command runs with after flags, environment, and file are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub db_path: PathBuf,
    pub origin_path: Option<PathBuf>,
    pub api_base_url: String,
    pub engine: EngineConfig,
}

/// Explicit inputs to [`RuntimeConfig::resolve`].
#[derive(Debug, Default)]
pub struct ConfigSources {
    pub cli_db_path: Option<PathBuf>,
    pub cli_origin_path: Option<PathBuf>,
    pub env_db_path: Option<PathBuf>,
    pub env_origin_path: Option<PathBuf>,
    pub env_api_base_url: Option<String>,
}

impl ConfigSources {
    pub fn from_env(cli_db_path: Option<PathBuf>, cli_origin_path: Option<PathBuf>) -> Self {
        Self {
            cli_db_path,
            cli_origin_path,
            env_db_path: env::var_os(ENV_DB_PATH).map(PathBuf::from),
            env_origin_path: env::var_os(ENV_ORIGIN_PATH).map(PathBuf::from),
            env_api_base_url: normalize_text_option(env::var(ENV_API_BASE_URL).ok()),
        }
    }
}

impl RuntimeConfig {
    /// Merge sources with precedence flag > environment > config file > default.
    pub fn resolve(sources: ConfigSources, file: &CliConfig) -> Result<Self, CliError> {
        let db_path = match sources
            .cli_db_path
            .or(sources.env_db_path)
            .or_else(|| file.db_path.clone())
        {
            Some(path) => path,
            None => default_db_path()?,
        };

        let origin_path = sources
            .cli_origin_path
            .or(sources.env_origin_path)
            .or_else(|| file.origin_path.clone());

        let api_base_url = sources
            .env_api_base_url
            .or_else(|| file.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        if !is_http_url(&api_base_url) {
            return Err(CliError::Config(
                "api_base_url must include http:// or https://".to_string(),
            ));
        }

        let engine = EngineConfig::default().with_overrides(&file.engine)?;

        Ok(Self {
            db_path,
            origin_path,
            api_base_url,
            engine,
        })
    }

    pub fn require_origin_path(&self) -> Result<&Path, CliError> {
        self.origin_path
            .as_deref()
            .ok_or(CliError::OriginNotConfigured)
    }
}
