//! Configuration for the command line tool.
//!
//! Values are layered with the `config` crate: built-in defaults, then an
//! optional TOML or YAML file, then environment variables prefixed with
//! `LOCKDOWN__` (for example `LOCKDOWN__LOCKOUT__MAX_RETRIES=5`).

use lockdown_core::LockoutSettings;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to build config: {0}")]
    Build(String),

    #[error("Failed to deserialize config: {0}")]
    Deserialize(String),

    #[error("Invalid lockout settings: {0}")]
    InvalidSettings(String),
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub lockout: LockoutSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://lockdown.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// A file given explicitly must exist; its format is picked from the
    /// extension.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, config::Environment::with_prefix("LOCKDOWN"))
    }

    fn load_with_env(
        path: Option<&str>,
        environment: config::Environment,
    ) -> Result<Self, ConfigError> {
        let defaults = config::Config::try_from(&AppConfig::default())
            .map_err(|e| ConfigError::Build(e.to_string()))?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        let config = builder
            .add_source(environment.separator("__").try_parsing(true))
            .build()
            .map_err(|e| ConfigError::Build(e.to_string()))?;

        let app: AppConfig = config
            .try_deserialize()
            .map_err(|e| ConfigError::Deserialize(e.to_string()))?;

        app.lockout
            .validate()
            .map_err(|e| ConfigError::InvalidSettings(e.to_string()))?;

        Ok(app)
    }
}
