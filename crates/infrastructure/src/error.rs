//! Infrastructure error handling
//!
//! Error conversion for database and external-service operations.

use magnetarr_core::MagnetarrError;
use thiserror::Error;

/// Infrastructure-specific errors
#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convert infrastructure errors to domain errors
impl From<InfrastructureError> for MagnetarrError {
    fn from(err: InfrastructureError) -> Self {
        match err {
            InfrastructureError::Database(sqlx_err) => MagnetarrError::DatabaseError {
                message: sqlx_err.to_string(),
            },
            InfrastructureError::Pool(msg) => MagnetarrError::DatabaseError { message: msg },
            InfrastructureError::Schema(msg) => MagnetarrError::ConfigurationError {
                field: "database_schema".to_string(),
                message: msg,
            },
            InfrastructureError::Serialization(err) => {
                MagnetarrError::SerializationError(err.to_string())
            }
        }
    }
}
