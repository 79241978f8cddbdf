//! Logging for the huddle services
//!
//! Wraps `tracing-subscriber` so binaries and tests install the same
//! filter and formatting from one [`LogConfig`].

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

/// Resolved logging settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LogLevel,
    pub with_timestamp: bool,
    pub with_target: bool,
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamp: true,
            with_target: true,
            json_format: false,
        }
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    /// Build from the `[logging]` config section
    pub fn from_config(config: &LoggingConfig) -> Result<Self, LoggingError> {
        let level: LogLevel = config.level.parse()?;
        Ok(Self {
            level,
            with_timestamp: config.with_timestamp,
            with_target: config.with_target,
            json_format: config.json_format,
        })
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }
}

/// Install the global subscriber with default settings
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
///
/// Fails if a subscriber is already installed.
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let registry = tracing_subscriber::registry().with(config.filter());
    let init_failed = |e: tracing_subscriber::util::TryInitError| {
        LoggingError::InitializationFailed(e.to_string())
    };

    match (config.json_format, config.with_timestamp) {
        (true, true) => registry
            .with(fmt::layer().json().with_target(config.with_target))
            .try_init()
            .map_err(init_failed),
        (true, false) => registry
            .with(fmt::layer().json().without_time().with_target(config.with_target))
            .try_init()
            .map_err(init_failed),
        (false, true) => registry
            .with(fmt::layer().with_target(config.with_target))
            .try_init()
            .map_err(init_failed),
        (false, false) => registry
            .with(fmt::layer().without_time().with_target(config.with_target))
            .try_init()
            .map_err(init_failed),
    }
}
