//! Logging setup on top of `tracing-subscriber`.
//!
//! The library itself only emits `tracing` events; binaries and tests opt in
//! to output by calling one of the initializers below.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: standard tracing filter, takes precedence when set
//! - `T2O_LOG_LEVEL`: simple level (error, warn, info, debug, trace)
//! - `T2O_LOG_FORMAT`: output format (`human` or `json`)

use std::sync::OnceLock;

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::env::{non_empty_var, LOG_FORMAT_ENV, LOG_LEVEL_ENV};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "pretty" => Some(LogFormat::Human),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include source file and line in every event.
    pub with_file_info: bool,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file_info(mut self, with_file_info: bool) -> Self {
        self.with_file_info = with_file_info;
        self
    }

    /// Configuration described by `T2O_LOG_LEVEL` and `T2O_LOG_FORMAT`.
    /// Unset or unrecognized values fall back to the defaults.
    pub fn from_env() -> Self {
        let level = non_empty_var(LOG_LEVEL_ENV)
            .and_then(|s| LogLevel::from_str(&s))
            .unwrap_or_default();
        let format = non_empty_var(LOG_FORMAT_ENV)
            .and_then(|s| LogFormat::from_str(&s))
            .unwrap_or_default();
        LoggingConfig::new().with_level(level).with_format(format)
    }
}

/// Installs a global subscriber configured from the environment.
///
/// Idempotent: only the first successful call installs anything.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    init_with_config(&LoggingConfig::from_env())
}

/// Installs a global subscriber for `config`. Idempotent.
pub fn init_with_config(config: &LoggingConfig) -> Result<(), LoggingError> {
    if TRACING_INITIALIZED.get().is_some() {
        return Ok(());
    }
    let filter = build_env_filter(config.level)?;
    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(false)
                    .with_file(config.with_file_info)
                    .with_line_number(config.with_file_info),
            )
            .try_init(),
        LogFormat::Human => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(config.with_file_info)
                    .with_line_number(config.with_file_info),
            )
            .try_init(),
    };
    installed.map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))?;
    let _ = TRACING_INITIALIZED.set(());
    Ok(())
}

fn build_env_filter(level: LogLevel) -> Result<EnvFilter, LoggingError> {
    let directives =
        non_empty_var("RUST_LOG").unwrap_or_else(|| level.as_filter_str().to_string());
    EnvFilter::try_new(directives).map_err(|e| LoggingError::InvalidFilter(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_and_format_parsing() {
        assert_eq!(LogLevel::from_str(" DEBUG "), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("loud"), None);
        assert_eq!(LogFormat::from_str("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::from_str("xml"), None);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = LoggingConfig::new()
            .with_level(LogLevel::Trace)
            .with_format(LogFormat::Json)
            .with_file_info(true);
        assert_eq!(config.level, LogLevel::Trace);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.with_file_info);
        assert_eq!(LoggingConfig::default().level, LogLevel::Warn);
    }
}
