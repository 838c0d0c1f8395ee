//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::api::response::ErrorResponse;

/// Result type alias for handlers
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Errors surfaced by HTTP handlers
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match self {
            AppError::Database(ref e) => {
                tracing::error!(error = ?e, "Database error");
                "A database error occurred".to_string()
            },
            AppError::Unavailable(ref message) => {
                tracing::warn!("Service unavailable: {}", message);
                message.clone()
            },
            AppError::NotFound(message) | AppError::Validation(message) => message,
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}
