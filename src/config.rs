//! # Configuration
//!
//! Settings are layered, later layers winning:
//!
//! 1. built-in defaults
//! 2. an optional TOML file with `[pool]` and `[logging]` tables
//! 3. `KEIRO_*` environment variables
//!
//! ```toml
//! [pool]
//! workers = 8
//! strategy = "fixed"        # or "dynamic"
//! waiter_order = "fifo"     # or "lifo"
//! stack_size = "0x10000"    # bytes, integer or hex string
//! stream_window = 16
//!
//! [logging]
//! level = "info"
//! format = "json"           # or "pretty"
//! sampling_mode = "all"     # "error-only", "sampled"
//! sampling_rate = 1.0
//! async_logging = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::logging::LogConfig;
use crate::pool::PoolConfig;

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeiroConfig {
    pub pool: PoolConfig,
    pub logging: LogConfig,
}

impl KeiroConfig {
    /// Load defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`KeiroConfig::load`] with a custom environment lookup.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.pool.apply_env(&lookup)?;
        config.logging.apply_env(&lookup)?;
        Ok(config)
    }

    /// Parse a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
