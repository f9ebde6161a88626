use thiserror::Error;

/// Lead engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Reading or writing the record store failed; safe to retry
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    /// Every allocation attempt lost its optimistic-concurrency race
    #[error("Allocation contention for request {request_id} after {attempts} attempts")]
    AllocationContention { request_id: String, attempts: u32 },

    /// Input failed validation
    #[error("Invalid input: {0}")]
    Validation(String),

    /// No caller identity was presented
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is known but lacks the required role or ownership
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Request was withdrawn earlier
    #[error("Request already withdrawn: {0}")]
    AlreadyWithdrawn(String),

    /// The requested status change is not allowed from the current status
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error, e.g. an unreadable stored value
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller may retry the same operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_) | Error::AllocationContention { .. })
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Error::Validation(errors.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Error::Config(error.to_string())
    }
}

impl From<leadflow_infra_common::Error> for Error {
    fn from(error: leadflow_infra_common::Error) -> Self {
        Error::Config(error.to_string())
    }
}

/// Result type for lead engine operations
pub type Result<T> = std::result::Result<T, Error>;
