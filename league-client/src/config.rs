//! Configuration loading for the league client.
//!
//! Configuration is loaded from a TOML file (default: `tracker.toml`).
//! Every section and key is optional.

use league_store::StoreError;
use league_types::{Author, Scope};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration for the league client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackerConfig {
    /// This device.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Object store locations.
    #[serde(default)]
    pub stores: StoresConfig,
    /// History processing.
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Device configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Human-readable device name.
    #[serde(default = "default_device_name")]
    pub name: String,
    /// Author tag recorded on this device's own transactions (default: `app`).
    #[serde(default = "default_author")]
    pub author: String,
}

/// Object store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoresConfig {
    /// Directory holding one `<scope>/database.sqlite` per scope.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Cloud container the stores mirror to.
    #[serde(default = "default_container_identifier")]
    pub container_identifier: String,
    /// Keep every store in memory (tests, previews).
    #[serde(default)]
    pub in_memory: bool,
}

/// History processing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Path to the SQLite database holding history tokens.
    #[serde(default = "default_token_database")]
    pub token_database: PathBuf,
    /// Maximum transactions fetched per page (default: 500, 0 = unlimited).
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

// Default value functions
fn default_device_name() -> String {
    "JanKenPon device".to_string()
}

fn default_author() -> String {
    "app".to_string()
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_container_identifier() -> String {
    "iCloud.jankenpon.leagues".to_string()
}

fn default_token_database() -> PathBuf {
    PathBuf::from("data/history.sqlite")
}

fn default_batch_limit() -> usize {
    500
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            author: default_author(),
        }
    }
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            container_identifier: default_container_identifier(),
            in_memory: false,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            token_database: default_token_database(),
            batch_limit: default_batch_limit(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// A configuration keeping everything in memory.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.stores.in_memory = true;
        config
    }

    /// Set the author tag of this device's write path.
    pub fn with_author(mut self, author: &str) -> Self {
        self.device.author = author.to_string();
        self
    }

    /// The author tag of this device's write path.
    pub fn author(&self) -> Author {
        Author::new(self.device.author.clone())
    }

    /// Page size for history fetches, `None` when unlimited.
    pub fn batch_limit(&self) -> Option<usize> {
        match self.history.batch_limit {
            0 => None,
            limit => Some(limit),
        }
    }
}

/// Configuration error types. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A data folder could not be created.
    #[error("failed to create folder {path}: {source}")]
    CreateDir {
        /// Folder that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// A store could not be opened.
    #[error("failed to open {scope} store: {source}")]
    Provision {
        /// Scope of the store.
        scope: Scope,
        /// Underlying store error.
        source: StoreError,
    },
    /// No store was supplied for a scope.
    #[error("no store for scope {0}")]
    MissingScope(Scope),
    /// Several stores were supplied for one scope.
    #[error("more than one store for scope {0}")]
    DuplicateScope(Scope),
    /// The history token database could not be opened.
    #[error("failed to open token database {path}: {source}")]
    TokenStore {
        /// Path to the token database.
        path: PathBuf,
        /// Underlying store error.
        source: StoreError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TrackerConfig::default();
        assert_eq!(config.device.author, "app");
        assert_eq!(config.stores.base_dir, PathBuf::from("data"));
        assert!(!config.stores.in_memory);
        assert_eq!(config.batch_limit(), Some(500));
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[device]
name = "Ann's phone"
author = "ann-phone"

[stores]
base_dir = "/var/lib/jankenpon"
container_identifier = "iCloud.example"

[history]
token_database = "/var/lib/jankenpon/history.sqlite"
batch_limit = 0
"#;

        let config: TrackerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.device.name, "Ann's phone");
        assert_eq!(config.author(), Author::new("ann-phone"));
        assert_eq!(config.stores.base_dir, PathBuf::from("/var/lib/jankenpon"));
        assert_eq!(config.stores.container_identifier, "iCloud.example");
        assert_eq!(config.batch_limit(), None);
    }

    #[test]
    fn config_missing_sections_use_defaults() {
        let config: TrackerConfig = toml::from_str("").unwrap();
        assert_eq!(config.history.batch_limit, 500);
        assert_eq!(
            config.history.token_database,
            PathBuf::from("data/history.sqlite")
        );
    }

    #[test]
    fn from_file_reports_missing_file() {
        let result = TrackerConfig::from_file(Path::new("/nonexistent/tracker.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.toml");
        std::fs::write(&path, "[stores]\nin_memory = \"yes\"\n").unwrap();
        let result = TrackerConfig::from_file(&path);
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn in_memory_builder() {
        let config = TrackerConfig::in_memory().with_author("device:a");
        assert!(config.stores.in_memory);
        assert_eq!(config.author().as_str(), "device:a");
    }
}
