//! Configuration for the model engine
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (models.toml)
//! - Environment variables (MODELS__*)
//!
//! ## Example config file (models.toml):
//! ```toml
//! [errors]
//! max_value_length = 80
//!
//! [logging]
//! filter = "familiar_models=debug"
//! ```

use std::sync::OnceLock;

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

static CURRENT: OnceLock<EngineConfig> = OnceLock::new();

/// Main configuration for the model engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Error rendering settings
    #[serde(default)]
    pub errors: ErrorConfig,

    /// Logging settings (consumed by binaries)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Error rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorConfig {
    /// Strings longer than this are truncated when rendered into error messages
    #[serde(default = "default_max_value_length")]
    pub max_value_length: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive when RUST_LOG is not set
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_max_value_length() -> usize {
    50
}

fn default_filter() -> String {
    "warn".to_string()
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self {
            max_value_length: default_max_value_length(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["models.toml", ".models.toml", "config/models.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "models") {
            let xdg_config = config_dir.config_dir().join("models.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("MODELS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

/// Install the process-wide configuration.
///
/// Only the first call wins; returns `false` if a configuration was already in place.
pub fn install(config: EngineConfig) -> bool {
    CURRENT.set(config).is_ok()
}

/// The process-wide configuration (defaults if none was installed)
pub fn current() -> &'static EngineConfig {
    CURRENT.get_or_init(EngineConfig::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.errors.max_value_length, 50);
        assert_eq!(config.logging.filter, "warn");
    }

    #[test]
    fn test_serialize_config() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[errors]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[errors]\nmax_value_length = 12\n").unwrap();

        let config = EngineConfig::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.errors.max_value_length, 12);
        assert_eq!(config.logging.filter, "warn");
    }

    #[test]
    fn test_save_round_trips_through_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = EngineConfig::default();
        config.logging.filter = "familiar_models=trace".to_string();
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = EngineConfig::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(loaded.logging.filter, "familiar_models=trace");
    }
}
