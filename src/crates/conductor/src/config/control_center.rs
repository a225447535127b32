//! Control center configuration
//!
//! Loads `control-center.toml`. Every section is optional and falls back
//! to its defaults, so an empty file (or no file at all) is a valid setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::deployment::FactoryConfig;
use crate::dispatch::DispatchConfig;
use crate::jobs::JobsConfig;
use crate::metrics::MetricsConfig;
use crate::registry::RegistryConfig;
use crate::routing::RoutingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<ConfigError> for crate::ConductorError {
    fn from(err: ConfigError) -> Self {
        crate::ConductorError::Config(err.to_string())
    }
}

/// `[server]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Name reported by the health endpoint
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Allowed browser origins, any origin when empty
    pub cors_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: "control-center".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_origins: Vec::new(),
        }
    }
}

/// `[database]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// SQLite database file shared with the workers
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: "conductor.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Complete control center configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlCenterConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub registry: RegistryConfig,
    pub routing: RoutingConfig,
    pub jobs: JobsConfig,
    pub factory: FactoryConfig,
    pub metrics: MetricsConfig,
    pub dispatch: DispatchConfig,
}

impl ControlCenterConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default locations.
    ///
    /// Searches `CONFIG_PATH`, then `config/control-center.toml`, then
    /// `./control-center.toml`. Returns the defaults when no file exists;
    /// an explicit `CONFIG_PATH` that cannot be read is an error.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(config_path) = std::env::var("CONFIG_PATH") {
            return Self::from_file(config_path);
        }

        let paths = [
            PathBuf::from("config/control-center.toml"),
            PathBuf::from("./control-center.toml"),
        ];
        for path in &paths {
            if path.exists() {
                tracing::info!("Loading configuration from {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("database.path must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidConfig(
                "database.max_connections must be positive".into(),
            ));
        }
        if self.factory.port_range == 0 {
            return Err(ConfigError::InvalidConfig("factory.port_range must be positive".into()));
        }
        if u32::from(self.factory.base_port) + u32::from(self.factory.port_range) > 65_536 {
            return Err(ConfigError::InvalidConfig(format!(
                "factory ports {}+{} exceed 65535",
                self.factory.base_port, self.factory.port_range
            )));
        }
        if !(0.0..=1.0).contains(&self.factory.load_threshold) {
            return Err(ConfigError::InvalidConfig(
                "factory.load_threshold must be within 0..=1".into(),
            ));
        }
        if self.registry.dead_threshold_secs < self.registry.heartbeat_interval_secs {
            return Err(ConfigError::InvalidConfig(
                "registry.dead_threshold_secs must not be shorter than the heartbeat interval".into(),
            ));
        }
        Ok(())
    }

    /// Get database URL from configuration
    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.database.path)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
