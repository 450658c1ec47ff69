use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::sync::EngineConfig;

const DEFAULT_RELAY_URL: &str = "ws://localhost:8080";

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Relay and engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Relay URL (e.g., "ws://localhost:8080" or "wss://relay.example.com")
    pub relay_url: String,
    /// Seconds between background bookmark fetches
    pub fetch_interval_secs: u64,
    /// Maximum records requested per page
    pub page_size: u32,
    /// Seconds to wait for the relay when joining a group
    pub pairing_timeout_secs: u64,
    /// Seconds after which an unanswered fetch stops blocking new ones
    pub in_flight_timeout_secs: u64,
    /// Ask the relay for debug messages
    pub debug: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            fetch_interval_secs: 30,
            page_size: 300,
            pairing_timeout_secs: 25,
            in_flight_timeout_secs: 90,
            debug: false,
        }
    }
}

impl SyncConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            fetch_interval: Duration::from_secs(self.fetch_interval_secs.max(1)),
            page_size: self.page_size.max(1),
            pairing_timeout: Duration::from_secs(self.pairing_timeout_secs),
            in_flight_timeout: Duration::from_secs(self.in_flight_timeout_secs),
            server_url: self.relay_url.clone(),
            debug: self.debug,
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// Directory holding the sync seed
    pub data_dir: ConfigValue<PathBuf>,
    /// Name announced to the other devices of the group
    pub device_name: ConfigValue<String>,
    /// Relay URL, tracked separately so its source can be shown
    pub relay_url: ConfigValue<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Sync configuration
    pub sync: SyncConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    device_name: Option<String>,
    sync: Option<SyncFile>,
}

/// The `sync` section as written; `relay_url` is kept apart so its source is known
#[derive(Debug, Deserialize)]
struct SyncFile {
    relay_url: Option<String>,
    #[serde(flatten)]
    settings: SyncConfig,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let default_data_dir = Self::default_data_dir();

        // Start with defaults
        let mut database_path = ConfigValue::new(
            default_data_dir.join("seedsync.db"),
            ConfigSource::Default,
        );
        let mut data_dir = ConfigValue::new(default_data_dir, ConfigSource::Default);
        let mut device_name = ConfigValue::new(Self::default_device_name(), ConfigSource::Default);
        let mut config_file = None;
        let mut sync = SyncConfig::default();
        let mut relay_source = ConfigSource::Default;

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                database_path = ConfigValue::new(resolve(&path, db_path), ConfigSource::File);
            }
            if let Some(dir) = file_config.data_dir {
                data_dir = ConfigValue::new(resolve(&path, dir), ConfigSource::File);
            }
            if let Some(name) = file_config.device_name {
                device_name = ConfigValue::new(name, ConfigSource::File);
            }
            if let Some(sync_file) = file_config.sync {
                sync = sync_file.settings;
                if let Some(url) = sync_file.relay_url {
                    sync.relay_url = url;
                    relay_source = ConfigSource::File;
                }
            }
        }

        // Apply environment variable overrides
        if let Ok(db_path) = std::env::var("SEEDSYNC_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(dir) = std::env::var("SEEDSYNC_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Ok(name) = std::env::var("SEEDSYNC_DEVICE_NAME") {
            device_name = ConfigValue::new(name, ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("SEEDSYNC_RELAY_URL") {
            sync.relay_url = url;
            relay_source = ConfigSource::Environment;
        }

        Ok(Self {
            database_path,
            data_dir,
            device_name,
            relay_url: ConfigValue::new(sync.relay_url.clone(), relay_source),
            config_file,
            sync,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/seedsync/
    /// - macOS: ~/Library/Application Support/seedsync/
    /// - Windows: %APPDATA%/seedsync/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("seedsync")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/seedsync/
    /// - macOS: ~/Library/Application Support/seedsync/
    /// - Windows: %APPDATA%/seedsync/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("seedsync")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }

    fn default_device_name() -> String {
        std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "seedsync device".to_string())
    }
}

/// Resolve relative paths against the config file's directory
fn resolve(config_path: &std::path::Path, path: PathBuf) -> PathBuf {
    if path.is_relative() {
        config_path.parent().map(|p| p.join(&path)).unwrap_or(path)
    } else {
        path
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
