//! CLI configuration: manager limits plus where and how sessions are stored.
//!
//! ```toml
//! [manager]
//! max_lifetime_secs = 3600
//! max_idle_secs = 1800
//! gc_mode = "stale_end"
//!
//! [store]
//! path = "/var/lib/app/sessions.db"
//! secret_env = "SATCHEL_SECRET"
//! ```

use std::path::{Path, PathBuf};

use satchel_session::ManagerConfig;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const APP_NAME: &str = "satchel";
const CONFIG_DIR_ENV: &str = "SATCHEL_CONFIG_DIR";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_DB_FILE: &str = "sessions.db";
const DEFAULT_SECRET_ENV: &str = "SATCHEL_SECRET";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// No explicit database path and no platform config directory.
    #[error("no store path configured and no config directory available")]
    NoStorePath,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SatchelConfig {
    pub manager: ManagerConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file. Defaults to `<config dir>/sessions.db`.
    pub path: Option<PathBuf>,

    /// Environment variable holding the encryption secret.
    pub secret_env: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            secret_env: DEFAULT_SECRET_ENV.to_string(),
        }
    }
}

impl SatchelConfig {
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// The configured database path, or the default under the config dir.
    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.store.path {
            Some(path) => Ok(path.clone()),
            None => xdg_config_dir()
                .map(|dir| dir.join(DEFAULT_DB_FILE))
                .ok_or(ConfigError::NoStorePath),
        }
    }
}

/// Get the config directory for satchel.
///
/// Checks `SATCHEL_CONFIG_DIR` env var first, then falls back to platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<SatchelConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    SatchelConfig::from_toml(&contents)
}

/// Load the explicit file if given, else `config.toml` from the config dir
/// if present, else defaults.
pub fn load(explicit: Option<&Path>) -> Result<SatchelConfig> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }

    match xdg_config_dir().map(|dir| dir.join(CONFIG_FILE)) {
        Some(path) if path.is_file() => {
            debug!("Loading config from {:?}", path);
            load_config_file(&path)
        }
        _ => {
            debug!("No config file found, using defaults");
            Ok(SatchelConfig::default())
        }
    }
}
