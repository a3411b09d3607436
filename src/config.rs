use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::neighbors::SearchRadius;

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

/// Remote nearby-users procedure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NeighborsConfig {
    /// Base URL of the RPC endpoint (e.g., "https://db.example.com")
    pub url: Option<String>,
    /// API key sent with every call
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl NeighborsConfig {
    /// Returns true if a remote endpoint is configured
    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// User the CLI acts as
    pub user_id: ConfigValue<Option<Uuid>>,
    /// Default search radius
    pub radius: ConfigValue<SearchRadius>,
    /// How often `watch` polls for changes made elsewhere, in milliseconds
    pub poll_interval_ms: ConfigValue<u64>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub neighbors: NeighborsConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    user_id: Option<Uuid>,
    radius_km: Option<f64>,
    poll_interval_ms: Option<u64>,
    neighbors: Option<NeighborsConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut database_path = ConfigValue::new(
            Self::default_data_dir().join("pantryshare.db"),
            ConfigSource::Default,
        );
        let mut user_id = ConfigValue::new(None, ConfigSource::Default);
        let mut radius = ConfigValue::new(SearchRadius::default(), ConfigSource::Default);
        let mut poll_interval_ms = ConfigValue::new(1000, ConfigSource::Default);
        let mut config_file = None;
        let mut neighbors = NeighborsConfig::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Resolve relative paths against config file's directory
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(id) = file_config.user_id {
                user_id = ConfigValue::new(Some(id), ConfigSource::File);
            }
            if let Some(km) = file_config.radius_km {
                let r = SearchRadius::from_km(km)
                    .ok_or_else(|| ConfigError::InvalidValue("radius_km", km.to_string()))?;
                radius = ConfigValue::new(r, ConfigSource::File);
            }
            if let Some(ms) = file_config.poll_interval_ms {
                poll_interval_ms = ConfigValue::new(ms, ConfigSource::File);
            }
            if let Some(n) = file_config.neighbors {
                neighbors = n;
            }
        }

        // Apply environment variable overrides
        if let Ok(db_path) = std::env::var("PANTRYSHARE_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(id) = std::env::var("PANTRYSHARE_USER_ID") {
            let id = Uuid::parse_str(&id)
                .map_err(|_| ConfigError::InvalidValue("PANTRYSHARE_USER_ID", id.clone()))?;
            user_id = ConfigValue::new(Some(id), ConfigSource::Environment);
        }
        if let Ok(km) = std::env::var("PANTRYSHARE_RADIUS_KM") {
            let r = km
                .parse::<SearchRadius>()
                .map_err(|_| ConfigError::InvalidValue("PANTRYSHARE_RADIUS_KM", km.clone()))?;
            radius = ConfigValue::new(r, ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("PANTRYSHARE_NEIGHBORS_URL") {
            neighbors.url = Some(url);
        }
        if let Ok(key) = std::env::var("PANTRYSHARE_NEIGHBORS_API_KEY") {
            neighbors.api_key = Some(key);
        }

        Ok(Self {
            database_path,
            user_id,
            radius,
            poll_interval_ms,
            config_file,
            neighbors,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/pantryshare/
    /// - macOS: ~/Library/Application Support/pantryshare/
    /// - Windows: %APPDATA%/pantryshare/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pantryshare")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/pantryshare/
    /// - macOS: ~/Library/Application Support/pantryshare/
    /// - Windows: %APPDATA%/pantryshare/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pantryshare")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
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
            ConfigError::InvalidValue(key, value) => {
                write!(f, "Invalid value for {}: '{}'", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
