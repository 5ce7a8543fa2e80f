//! Log output settings

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level or filter directives, e.g. `info` or `warn,trellis_query=debug`
    #[serde(default = "default_level")]
    pub level: String,
    /// Colored output
    #[serde(default = "default_true")]
    pub ansi: bool,
}

fn default_level() -> String {
    "warn".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Every directive must end in a known level.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for directive in self.level.split(',').map(str::trim) {
            let level = directive.rsplit('=').next().unwrap_or(directive);
            if !LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "unknown log level '{level}' in '{}'",
                    self.level
                )));
            }
        }
        Ok(())
    }
}
