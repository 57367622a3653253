//! API error handling and response types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use magnetarr_core::MagnetarrError;
use serde_json::json;
use thiserror::Error;

/// API-specific error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Core error: {0}")]
    CoreError(#[from] MagnetarrError),

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::BadRequest { message } => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound { resource } => {
                (StatusCode::NOT_FOUND, format!("not found: {}", resource))
            }
            ApiError::CoreError(core_error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                core_error.to_string(),
            ),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
