use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::protocol::DEFAULT_STREAM_WINDOW;
use crate::worker::{WorkerOptions, DEFAULT_STACK_SIZE};

/// How a pool sizes itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStrategy {
    /// Exactly N workers; `take()` blocks when all are checked out
    #[default]
    Fixed,
    /// N idle workers kept warm; `take()` spawns when none is idle
    Dynamic,
}

impl FromStr for PoolStrategy {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "dynamic" => Ok(Self::Dynamic),
            _ => Err("expected 'fixed' or 'dynamic'"),
        }
    }
}

impl fmt::Display for PoolStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PoolStrategy::Fixed => "fixed",
            PoolStrategy::Dynamic => "dynamic",
        })
    }
}

/// Which blocked caller a released worker goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaiterOrder {
    /// Longest-waiting caller first
    #[default]
    Fifo,
    /// Most recent caller first
    Lifo,
}

impl FromStr for WaiterOrder {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "lifo" => Ok(Self::Lifo),
            _ => Err("expected 'fifo' or 'lifo'"),
        }
    }
}

/// Worker pool settings.
///
/// Environment variables:
///
/// - `KEIRO_WORKERS`: worker count (default: available parallelism)
/// - `KEIRO_POOL_STRATEGY`: `fixed` or `dynamic` (default: `fixed`)
/// - `KEIRO_WAITER_ORDER`: `fifo` or `lifo` (default: `fifo`)
/// - `KEIRO_WORKER_STACK_SIZE`: decimal or `0x` hex bytes (default: `0x10000`)
/// - `KEIRO_STREAM_WINDOW`: unacknowledged chunks per worker (default: 16)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    pub workers: usize,
    pub strategy: PoolStrategy,
    pub waiter_order: WaiterOrder,
    #[serde(deserialize_with = "deserialize_stack_size")]
    pub stack_size: usize,
    pub stream_window: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            strategy: PoolStrategy::default(),
            waiter_order: WaiterOrder::default(),
            stack_size: DEFAULT_STACK_SIZE,
            stream_window: DEFAULT_STREAM_WINDOW,
        }
    }
}

impl PoolConfig {
    /// Defaults overridden by `KEIRO_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from `lookup`, which maps a variable name to its value.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("KEIRO_WORKERS") {
            self.workers = parse_env(
                "KEIRO_WORKERS",
                &value,
                |v| v.parse().ok(),
                "expected a non-negative integer",
            )?;
        }
        if let Some(value) = lookup("KEIRO_POOL_STRATEGY") {
            self.strategy = value
                .parse()
                .map_err(|reason| ConfigError::invalid("KEIRO_POOL_STRATEGY", &value, reason))?;
        }
        if let Some(value) = lookup("KEIRO_WAITER_ORDER") {
            self.waiter_order = value
                .parse()
                .map_err(|reason| ConfigError::invalid("KEIRO_WAITER_ORDER", &value, reason))?;
        }
        if let Some(value) = lookup("KEIRO_WORKER_STACK_SIZE") {
            self.stack_size = parse_env(
                "KEIRO_WORKER_STACK_SIZE",
                &value,
                parse_stack_size,
                "expected a byte count, decimal or 0x hex",
            )?;
        }
        if let Some(value) = lookup("KEIRO_STREAM_WINDOW") {
            self.stream_window = parse_env(
                "KEIRO_STREAM_WINDOW",
                &value,
                |v| v.parse().ok(),
                "expected a positive integer",
            )?;
        }
        self.validate()
    }

    /// Reject values no pool can run with. A worker count of zero is left to
    /// pool construction, which reports it as a configuration error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream_window == 0 {
            return Err(ConfigError::invalid("stream_window", "0", "must be at least 1"));
        }
        Ok(())
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            stack_size: self.stack_size,
            stream_window: self.stream_window,
        }
    }
}

fn parse_env<T>(
    key: &str,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
    reason: &'static str,
) -> Result<T, ConfigError> {
    parse(value.trim()).ok_or_else(|| ConfigError::invalid(key, value, reason))
}

/// Parse a stack size given in decimal or `0x`-prefixed hex.
pub fn parse_stack_size(s: &str) -> Option<usize> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn deserialize_stack_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bytes(usize),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Bytes(n) => Ok(n),
        Raw::Text(s) => parse_stack_size(&s).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid stack size '{s}', expected decimal or 0x hex"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_parse_stack_size() {
        assert_eq!(parse_stack_size("0x10000"), Some(65536));
        assert_eq!(parse_stack_size("32768"), Some(32768));
        assert_eq!(parse_stack_size("0xzz"), None);
        assert_eq!(parse_stack_size("-1"), None);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PoolConfig::default();
        config
            .apply_env(lookup(&[
                ("KEIRO_WORKERS", "3"),
                ("KEIRO_POOL_STRATEGY", "Dynamic"),
                ("KEIRO_WAITER_ORDER", "lifo"),
                ("KEIRO_WORKER_STACK_SIZE", "0x8000"),
                ("KEIRO_STREAM_WINDOW", "4"),
            ]))
            .unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.strategy, PoolStrategy::Dynamic);
        assert_eq!(config.waiter_order, WaiterOrder::Lifo);
        assert_eq!(config.stack_size, 0x8000);
        assert_eq!(config.stream_window, 4);
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let mut config = PoolConfig::default();
        let err = config
            .apply_env(lookup(&[("KEIRO_WORKERS", "-2")]))
            .unwrap_err();
        assert!(err.to_string().contains("KEIRO_WORKERS"));

        assert!(PoolConfig::default()
            .apply_env(lookup(&[("KEIRO_POOL_STRATEGY", "elastic")]))
            .is_err());
        assert!(PoolConfig::default()
            .apply_env(lookup(&[("KEIRO_STREAM_WINDOW", "0")]))
            .is_err());
    }

    #[test]
    fn test_toml_stack_size_accepts_hex_string() {
        let config: PoolConfig = toml::from_str("stack_size = \"0x4000\"\nworkers = 2").unwrap();
        assert_eq!(config.stack_size, 0x4000);
        assert_eq!(config.workers, 2);
        let config: PoolConfig = toml::from_str("stack_size = 8192").unwrap();
        assert_eq!(config.stack_size, 8192);
    }
}
