//! Configuration management for crowdsafe.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::SocketAddr;
use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "crowdsafe";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "predictions.db";

/// Default export file name.
const EXPORT_FILE_NAME: &str = "predictions.csv";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `CROWDSAFE_`, sections split on `__`)
/// 2. TOML config file at `~/.config/crowdsafe/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Image detection configuration.
    pub detection: DetectionConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Directory holding the pre-built frontend, served for unmatched paths.
    pub static_dir: Option<PathBuf>,
    /// Largest accepted image upload, in bytes.
    pub max_upload_bytes: usize,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/crowdsafe/predictions.db`
    pub database_path: Option<PathBuf>,
    /// Path to the CSV export log.
    /// Defaults to `~/.local/share/crowdsafe/predictions.csv`
    pub export_path: Option<PathBuf>,
    /// Number of records returned by the history listing.
    pub history_limit: usize,
}

/// Image detection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Lower bound of the estimate used when nobody is detected.
    pub fallback_min: u32,
    /// Upper bound of the estimate used when nobody is detected.
    pub fallback_max: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            static_dir: None,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            export_path: None,
            history_limit: 50,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            fallback_min: 20,
            fallback_max: 200,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
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
            .merge(Env::prefixed("CROWDSAFE_").split("__"));

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
        if self.server.port == 0 {
            return Err(Error::ConfigValidation {
                message: "port must be greater than 0".to_string(),
            });
        }

        if self.server.host.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "host must not be empty".to_string(),
            });
        }

        if self.server.max_upload_bytes == 0 {
            return Err(Error::ConfigValidation {
                message: "max_upload_bytes must be greater than 0".to_string(),
            });
        }

        if self.storage.history_limit == 0 {
            return Err(Error::ConfigValidation {
                message: "history_limit must be greater than 0".to_string(),
            });
        }

        if self.detection.fallback_min > self.detection.fallback_max {
            return Err(Error::ConfigValidation {
                message: format!(
                    "fallback_min ({}) cannot be greater than fallback_max ({})",
                    self.detection.fallback_min, self.detection.fallback_max
                ),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the export log path, resolving defaults if not set.
    #[must_use]
    pub fn export_path(&self) -> PathBuf {
        self.storage
            .export_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(EXPORT_FILE_NAME))
    }

    /// Get the socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a valid address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| Error::ConfigValidation {
                message: format!("invalid bind address {}: {e}", self.server.host),
            })
    }
}
