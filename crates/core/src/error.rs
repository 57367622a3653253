//! Core error types for the Magnetarr domain

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MagnetarrError {
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Indexer error: {message}")]
    IndexerError { message: String },

    #[error("Domain validation error: {field} - {message}")]
    ValidationError { field: String, message: String },

    #[error("External service error: {service} - {error}")]
    ExternalServiceError { service: String, error: String },

    #[error("Network error for {url}: {error}")]
    NetworkError {
        url: String,
        error: String,
        /// Transient failures (timeout, reset, DNS) may be retried once.
        retryable: bool,
    },

    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Database error: {message}")]
    DatabaseError { message: String },

    #[error("Parse error in {context}: {message}")]
    ParseError { context: String, message: String },

    #[error("Solver error: {message}")]
    SolverError { message: String },

    #[error("Configuration error: {field} - {message}")]
    ConfigurationError { field: String, message: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl MagnetarrError {
    /// Whether a single in-driver retry is worth attempting.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MagnetarrError::NetworkError {
                retryable: true,
                ..
            } | MagnetarrError::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MagnetarrError>;
