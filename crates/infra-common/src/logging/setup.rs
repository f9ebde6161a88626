use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// The log level to use (`trace`, `debug`, `info`, `warn`, `error`)
    pub level: String,
    /// Whether to enable JSON formatting
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Whether to log span open/close events
    pub log_spans: bool,
    /// Application name logged at startup
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
            file_info: false,
            log_spans: false,
            app_name: "leadflow".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration
    pub fn new(level: impl Into<String>, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level: level.into(),
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Enable JSON formatting
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Enable file and line information in logs
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Enable span logging
    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }
}

/// Set up the global subscriber, failing if one is already installed
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    install(config, true)
}

/// Set up the global subscriber, ignoring an already-installed one.
///
/// Tests call this from many places; only the first call wins.
pub fn try_setup_logging(config: &LoggingConfig) -> Result<()> {
    install(config, false)
}

fn install(config: &LoggingConfig, strict: bool) -> Result<()> {
    let level = parse_log_level(&config.level)?;

    // RUST_LOG directives refine the configured level
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let span_events = if config.log_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if strict => Err(Error::Logging(e.to_string())),
        Err(_) => Ok(()),
    }
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| Error::Config(format!("Invalid log level: {}", level)))
}

/// Log a welcome message with version info
pub fn log_welcome(app_name: &str, version: &str) {
    tracing::info!("Starting {} v{}", app_name, version);
}
