use thiserror::Error;

/// Main error type for the control service
///
/// Only startup and wiring failures travel through this type. Script execution never
/// produces one: the process runner turns every launch failure into a `ProcessResult`.
#[derive(Error, Debug)]
pub enum ServiceError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Server errors
    #[error("HTTP server error: {0}")]
    Server(String),

    // CLI helper failures, already carrying their context chain
    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for ServiceError
pub type Result<T> = std::result::Result<T, ServiceError>;
