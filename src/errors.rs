use crate::response::ApiResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use deadpool_diesel::InteractError;
use deadpool_diesel::postgres::PoolError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String), // 400

    #[error("Not Found: {0}")]
    NotFound(String), // 404

    #[error("Conflict: {0}")]
    Conflict(String), // 409

    #[error("Unprocessable Entity: {0}")]
    UnprocessableEntity(String), // 422

    #[error("Database pool error: {0}")]
    PoolError(#[from] PoolError), // 500

    #[error("Database interaction error: {0}")]
    InteractError(#[from] InteractError), // 500

    #[error("Database query error: {0}")]
    DieselError(#[from] diesel::result::Error), // 404 for NotFound, otherwise 500

    #[error("Internal Server Error: {0}")]
    Internal(#[from] anyhow::Error), // 500
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::Conflict(message) => (StatusCode::CONFLICT, message),
            AppError::UnprocessableEntity(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),

            AppError::DieselError(diesel::result::Error::NotFound) => (
                StatusCode::NOT_FOUND,
                "Resource not found (database query)".to_string(),
            ),

            AppError::PoolError(source) => {
                error!("Responding with 500. Pool error: {:?}", source);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
            AppError::InteractError(source) => {
                error!("Responding with 500. Interact error: {:?}", source);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
            AppError::DieselError(source) => {
                error!("Responding with 500. Diesel error: {:?}", source);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
            AppError::Internal(source) => {
                error!("Responding with 500. Source: {:?}", source);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = ApiResponse::<()> {
            status_code: status.as_u16(),
            status_message: error_message,
            data: None,
        };

        (status, body).into_response()
    }
}
