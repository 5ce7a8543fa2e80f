//! Top-level configuration and loading

use crate::components::{ExecutionConfig, LoggingConfig, SchemaConfig, StoreConfig};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Environment variable that replaces `logging.level`.
pub const LOG_ENV_VAR: &str = "TRELLIS_LOG";

/// Trellis configuration, one section per concern.
///
/// Every field has a default, so an empty file (or no file) is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrellisConfig {
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TrellisConfig {
    /// Parse a TOML document, apply environment overrides and validate.
    pub fn from_toml_str(input: &str, origin: &Path) -> Result<Self, ConfigError> {
        let mut config: TrellisConfig = toml::from_str(input).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loading config");
        Self::from_toml_str(&input, path)
    }

    /// Load `path` when given, otherwise defaults plus environment overrides.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var(LOG_ENV_VAR) {
            if !level.trim().is_empty() {
                self.logging.level = level;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging.validate()
    }
}
