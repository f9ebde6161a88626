//! Service configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `LEADFLOW__`-prefixed environment variables (`LEADFLOW__DATABASE__URL`,
//! `LEADFLOW__ALLOCATION__MAX_ATTEMPTS`, ...).

use std::path::Path;
use std::time::Duration;

use leadflow_infra_common::LoggingConfig;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadflowConfig {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub allocation: AllocationConfig,
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite://leadflow.db` or `sqlite::memory:`
    pub url: String,
    pub max_connections: u32,
    /// How long a writer waits on a locked database before failing
    pub busy_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_address: String,
}

/// Allocator tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Selection/commit rounds before reporting contention
    pub max_attempts: u32,
    /// Pause between rounds after losing an agent slot
    pub retry_backoff_ms: u64,
}

/// Notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub assignment_subject: String,
    pub verification_subject: String,
}

impl LeadflowConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&LeadflowConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("LEADFLOW")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Configuration backed by a private in-memory database
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.database.url = "sqlite::memory:".to_string();
        config
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

impl AllocationConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://leadflow.db".to_string(),
            max_connections: 8,
            busy_timeout_ms: 5_000,
            acquire_timeout_ms: 10_000,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_backoff_ms: 20,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            assignment_subject: "New Client Request Assigned".to_string(),
            verification_subject: "Agent Application Update".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LeadflowConfig::default();
        assert_eq!(config.allocation.max_attempts, 5);
        assert_eq!(config.database.busy_timeout(), Duration::from_secs(5));
        assert!(!config.database.is_in_memory());
        assert!(LeadflowConfig::in_memory().database.is_in_memory());
    }

    #[test]
    #[serial]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[allocation]\nmax_attempts = 9\n\n[api]\nbind_address = \"0.0.0.0:9000\"\n"
        )
        .unwrap();

        let config = LeadflowConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.allocation.max_attempts, 9);
        assert_eq!(config.allocation.retry_backoff_ms, 20);
        assert_eq!(config.api.bind_address, "0.0.0.0:9000");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    #[serial]
    fn test_missing_file_is_an_error() {
        let result = LeadflowConfig::load(Some(Path::new("/nonexistent/leadflow.toml")));
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[allocation]\nmax_attempts = 9\n").unwrap();

        std::env::set_var("LEADFLOW__ALLOCATION__MAX_ATTEMPTS", "3");
        std::env::set_var("LEADFLOW__DATABASE__URL", "sqlite::memory:");
        let result = LeadflowConfig::load(Some(file.path()));
        std::env::remove_var("LEADFLOW__ALLOCATION__MAX_ATTEMPTS");
        std::env::remove_var("LEADFLOW__DATABASE__URL");

        let config = result.unwrap();
        assert_eq!(config.allocation.max_attempts, 3);
        assert!(config.database.is_in_memory());
    }
}
