//! # Leadflow Infra-Common
//!
//! Shared infrastructure for the leadflow services. Currently this is the
//! logging bootstrap used by the `leadflow` binary and the integration tests.

pub mod errors;
pub mod logging;

pub use errors::{Error, Result};
pub use logging::{setup_logging, try_setup_logging, parse_log_level, log_welcome, LoggingConfig};
