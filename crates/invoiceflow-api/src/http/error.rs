//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use invoiceflow_types::error::RepositoryError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// No review record for this checkpoint id.
    CheckpointNotFound(String),
    /// Review-queue storage errors.
    Repository(RepositoryError),
    /// Malformed request body or parameter.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Repository(e)
    }
}

impl AppError {
    /// HTTP status and machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::CheckpointNotFound(_) | AppError::Repository(RepositoryError::NotFound) => {
                (StatusCode::NOT_FOUND, "CHECKPOINT_NOT_FOUND")
            }
            AppError::Repository(RepositoryError::Conflict(_)) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Repository(_) => (StatusCode::INTERNAL_SERVER_ERROR, "REPOSITORY_ERROR"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::CheckpointNotFound(id) => format!("Checkpoint '{id}' not found"),
            AppError::Repository(RepositoryError::NotFound) => "Checkpoint not found".to_string(),
            AppError::Repository(e) => e.to_string(),
            AppError::Validation(msg) | AppError::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.message();

        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        }

        let envelope = ApiResponse::failure(code, &message, String::new(), 0);
        let body = serde_json::to_string(&envelope).unwrap_or_else(|_| {
            r#"{"errors":[{"code":"SERIALIZATION_ERROR","message":"Failed to serialize response"}]}"#.to_string()
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}
