mod setup;

pub use setup::{setup_logging, try_setup_logging, parse_log_level, log_welcome, LoggingConfig};
