//! Logging configuration and initialization
//!
//! mmq emits `tracing` events throughout (device init/finalize, transfers,
//! dispatch, allocation failures). This module installs a subscriber for
//! them.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Standard tracing filter (e.g., "info", "debug,mmq_npu=trace")
//! - `MMQ_LOG_LEVEL`: Simple log level (error, warn, info, debug, trace)
//! - `MMQ_LOG_FORMAT`: Output format ("human" or "json")

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Set once a subscriber has been installed (or installation was attempted).
static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();

const LOG_LEVEL_ENV: &str = "MMQ_LOG_LEVEL";
const LOG_FORMAT_ENV: &str = "MMQ_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}")]
    InvalidLogFormat(String),

    /// Another global subscriber was installed first.
    #[error("failed to install subscriber: {0}")]
    InitFailed(String),
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
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
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
    /// Human-readable output (default)
    #[default]
    Human,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "human" | "pretty" | "console" => Some(LogFormat::Human),
            "json" | "structured" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include file/line in each event.
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

    /// Read `MMQ_LOG_LEVEL` and `MMQ_LOG_FORMAT` through `lookup`.
    ///
    /// Unset variables keep their defaults; unparsable ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LoggingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LoggingConfig::new();
        if let Some(raw) = lookup(LOG_LEVEL_ENV) {
            config.level = LogLevel::parse(&raw).ok_or(LoggingError::InvalidLogLevel(raw))?;
        }
        if let Some(raw) = lookup(LOG_FORMAT_ENV) {
            config.format = LogFormat::parse(&raw).ok_or(LoggingError::InvalidLogFormat(raw))?;
        }
        Ok(config)
    }

    pub fn from_env() -> Result<Self, LoggingError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Initialize logging from the environment, ignoring any error.
///
/// # Example
///
/// ```ignore
/// mmq::logging::init_logging_default();
/// tracing::info!("starting");
/// ```
pub fn init_logging_default() {
    init_logging_from_env().ok();
}

/// Initialize logging from `RUST_LOG`, `MMQ_LOG_LEVEL` and `MMQ_LOG_FORMAT`.
///
/// Idempotent: only the first successful call installs a subscriber.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let config = LoggingConfig::from_env()?;
    init_with_config(&config)
}

/// Initialize logging with an explicit configuration. Idempotent.
pub fn init_with_config(config: &LoggingConfig) -> Result<(), LoggingError> {
    let mut result = Ok(());
    TRACING_INITIALIZED.get_or_init(|| {
        result = install(config);
    });
    result
}

fn install(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_env_filter(config.level);
    let installed = match config.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_target(false)
                .with_file(config.with_file_info)
                .with_line_number(config.with_file_info);
            tracing_subscriber::registry().with(filter).with(layer).try_init()
        }
        LogFormat::Human => {
            let layer = fmt::layer()
                .with_target(true)
                .with_file(config.with_file_info)
                .with_line_number(config.with_file_info);
            tracing_subscriber::registry().with(filter).with(layer).try_init()
        }
    };
    installed.map_err(|e| LoggingError::InitFailed(e.to_string()))
}

/// `RUST_LOG` wins when set and valid; otherwise `level` applies to everything.
fn build_env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter_str()))
}

/// Whether a subscriber installation has been attempted.
pub fn is_initialized() -> bool {
    TRACING_INITIALIZED.get().is_some()
}
