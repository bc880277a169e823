//! Configuration management for feedlog.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "feedlog";

/// Default household database file name.
const CLOUD_DATABASE_FILE_NAME: &str = "household.db";

/// Default preference database file name.
const PREFERENCES_DATABASE_FILE_NAME: &str = "preferences.db";

/// Default container identifier.
pub const DEFAULT_CONTAINER_ID: &str = "feedlog.household";

/// Prefix of environment variables that override configuration.
pub const ENV_PREFIX: &str = "FEEDLOG_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `FEEDLOG_`, sections separated
///    by `__`, e.g. `FEEDLOG_CLOUD__ACCOUNT_ID`)
/// 2. TOML config file at `~/.config/feedlog/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Household database and account.
    pub cloud: CloudConfig,
    /// Local preference storage.
    pub preferences: PreferencesConfig,
    /// History synchronization.
    pub sync: SyncConfig,
}

/// Household database configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Path to the shared household database.
    /// Defaults to `~/.local/share/feedlog/household.db`
    pub database_path: Option<PathBuf>,
    /// Container holding the household's data.
    pub container_id: String,
    /// Account this device is signed in with. Unset means signed out.
    pub account_id: Option<String>,
}

/// Preference storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    /// Path to the preference database.
    /// Defaults to `~/.local/share/feedlog/preferences.db`
    pub database_path: Option<PathBuf>,
}

/// Synchronization configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between periodic refreshes in `watch` mode.
    pub refresh_interval_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Will be resolved to default at runtime
            container_id: DEFAULT_CONTAINER_ID.to_string(),
            account_id: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `FEEDLOG_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.cloud.container_id.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "cloud.container_id must not be empty".to_string(),
            });
        }

        if self.sync.refresh_interval_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "sync.refresh_interval_secs must be greater than 0".to_string(),
            });
        }

        if let (Some(cloud), Some(prefs)) =
            (&self.cloud.database_path, &self.preferences.database_path)
        {
            if cloud == prefs {
                return Err(Error::ConfigValidation {
                    message: format!(
                        "cloud and preference databases must be different files ({})",
                        cloud.display()
                    ),
                });
            }
        }

        Ok(())
    }

    /// Get the household database path, resolving defaults if not set.
    #[must_use]
    pub fn cloud_database_path(&self) -> PathBuf {
        self.cloud
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(CLOUD_DATABASE_FILE_NAME))
    }

    /// Get the preference database path, resolving defaults if not set.
    #[must_use]
    pub fn preferences_database_path(&self) -> PathBuf {
        self.preferences
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(PREFERENCES_DATABASE_FILE_NAME))
    }

    /// Get the refresh interval as a Duration.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.sync.refresh_interval_secs)
    }
}
