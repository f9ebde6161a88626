use thiserror::Error;

/// Errors raised while bootstrapping shared infrastructure
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// The global subscriber could not be installed
    #[error("Logging error: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;
