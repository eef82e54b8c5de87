use thiserror::Error;

use crate::backends::BackendError;
use crate::operations::OperationError;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid location '{location}': {reason}")]
    Location { location: String, reason: String },

    #[error("State store error: {0}")]
    StateStore(String),

    #[error(transparent)]
    Operation(#[from] OperationError),
}

pub type AppResult<T> = Result<T, AppError>;
