//! Structured logging setup.
//!
//! - JSON output for production, pretty output for development
//! - Sampling strategies (all, error-only, sampled)
//! - Optional non-blocking output through `tracing-appender`
//!
//! Log lines go to stderr so command output on stdout stays machine readable.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::subscriber::Interest;
use tracing::{Level, Metadata, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::ConfigError;

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err("expected 'json' or 'pretty'"),
        }
    }
}

/// Sampling mode: how to decide which logs to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingMode {
    /// Log everything
    #[default]
    All,
    /// Log only WARN and ERROR levels
    ErrorOnly,
    /// Sample below WARN, log all warnings and errors
    Sampled,
}

impl FromStr for SamplingMode {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(SamplingMode::All),
            "error-only" | "error_only" => Ok(SamplingMode::ErrorOnly),
            "sampled" => Ok(SamplingMode::Sampled),
            _ => Err("expected 'all', 'error-only' or 'sampled'"),
        }
    }
}

/// Logging configuration.
///
/// Environment variables: `KEIRO_LOG_LEVEL`, `KEIRO_LOG_FORMAT`,
/// `KEIRO_LOG_SAMPLING_MODE`, `KEIRO_LOG_SAMPLING_RATE`, `KEIRO_LOG_ASYNC`.
/// `RUST_LOG`, when set, replaces the level as the filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// trace/debug/info/warn/error
    pub level: String,
    pub format: LogFormat,
    pub sampling_mode: SamplingMode,
    /// Fraction of sub-WARN events kept in `sampled` mode (0.0-1.0)
    pub sampling_rate: f64,
    /// Write through a background thread
    pub async_logging: bool,
    /// Include file:line location
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            sampling_mode: SamplingMode::All,
            sampling_rate: 1.0,
            async_logging: false,
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Defaults overridden by `KEIRO_LOG_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Create a default configuration for local development
    pub fn default_dev() -> Self {
        Self {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            include_location: true,
            ..Self::default()
        }
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("KEIRO_LOG_LEVEL") {
            parse_level(&level)
                .ok_or_else(|| ConfigError::invalid("KEIRO_LOG_LEVEL", &level, "unknown level"))?;
            self.level = level.trim().to_ascii_lowercase();
        }
        if let Some(value) = lookup("KEIRO_LOG_FORMAT") {
            self.format = value
                .parse()
                .map_err(|reason| ConfigError::invalid("KEIRO_LOG_FORMAT", &value, reason))?;
        }
        if let Some(value) = lookup("KEIRO_LOG_SAMPLING_MODE") {
            self.sampling_mode = value
                .parse()
                .map_err(|reason| ConfigError::invalid("KEIRO_LOG_SAMPLING_MODE", &value, reason))?;
        }
        if let Some(value) = lookup("KEIRO_LOG_SAMPLING_RATE") {
            self.sampling_rate = value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|rate| (0.0..=1.0).contains(rate))
                .ok_or_else(|| {
                    ConfigError::invalid("KEIRO_LOG_SAMPLING_RATE", &value, "expected 0.0-1.0")
                })?;
        }
        if let Some(value) = lookup("KEIRO_LOG_ASYNC") {
            self.async_logging = value.trim().parse().map_err(|_| {
                ConfigError::invalid("KEIRO_LOG_ASYNC", &value, "expected true or false")
            })?;
        }
        Ok(())
    }
}

fn parse_level(level: &str) -> Option<Level> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Sampling layer: decides whether to emit a log based on sampling rules
pub struct SamplingLayer {
    mode: SamplingMode,
    sampling_rate: f64,
    counter: AtomicU64,
}

impl SamplingLayer {
    pub fn new(mode: SamplingMode, sampling_rate: f64) -> Self {
        Self {
            mode,
            sampling_rate: sampling_rate.clamp(0.0, 1.0),
            counter: AtomicU64::new(0),
        }
    }

    fn should_sample(&self, level: &Level) -> bool {
        let important = is_important(level);
        match self.mode {
            SamplingMode::All => true,
            SamplingMode::ErrorOnly => important,
            SamplingMode::Sampled => {
                if important {
                    return true;
                }
                if self.sampling_rate <= 0.0 {
                    return false;
                }
                let interval = (1.0 / self.sampling_rate) as u64;
                let count = self.counter.fetch_add(1, Ordering::Relaxed);
                interval > 0 && count % interval == 0
            }
        }
    }
}

fn is_important(level: &Level) -> bool {
    matches!(*level, Level::WARN | Level::ERROR)
}

impl<S> Layer<S> for SamplingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn register_callsite(&self, metadata: &'static Metadata<'static>) -> Interest {
        if !metadata.is_event() {
            return Interest::always();
        }
        let important = is_important(metadata.level());
        match self.mode {
            SamplingMode::All => Interest::always(),
            SamplingMode::ErrorOnly | SamplingMode::Sampled if important => Interest::always(),
            SamplingMode::ErrorOnly => Interest::never(),
            // Decided per event, so the callsite must not be cached
            SamplingMode::Sampled => Interest::sometimes(),
        }
    }

    fn enabled(&self, metadata: &Metadata<'_>, _ctx: LayerContext<'_, S>) -> bool {
        // Spans are never sampled away, only events
        !metadata.is_event() || self.should_sample(metadata.level())
    }
}

/// Keeps the background log writer alive. Dropping it flushes pending lines.
#[must_use = "dropping the guard stops asynchronous log output"]
pub struct LoggingGuard {
    _worker: Option<WorkerGuard>,
}

/// Install the global subscriber described by `config`.
///
/// Fails if a global subscriber is already set.
pub fn init_logging_with_config(config: &LogConfig) -> anyhow::Result<LoggingGuard> {
    let level = parse_level(&config.level).unwrap_or(Level::INFO);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let sampling_layer = SamplingLayer::new(config.sampling_mode, config.sampling_rate);

    let (writer, guard) = if config.async_logging {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(non_blocking), Some(guard))
    } else {
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stderr), None)
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_list(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(sampling_layer)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(LoggingGuard { _worker: guard })
}
