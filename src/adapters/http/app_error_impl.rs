use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::{StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};

const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please wait before trying again.";
const PROCESSING_ERROR_MESSAGE: &str = "Failed to process payment. Please try again later.";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the error before it gets converted into a status response.
        match &self {
            AppError::InvalidInput(_)
            | AppError::RateLimited { .. }
            | AppError::Unauthorized(_) => {
                tracing::warn!(error = %self, "Request rejected")
            }
            _ => tracing::error!(error = ?self, "Request failed"),
        }

        match self {
            AppError::Database(_) => error_resp(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::DatabaseError,
                PROCESSING_ERROR_MESSAGE,
            ),
            AppError::RateLimited { retry_after_secs } => {
                let mut response = error_resp(
                    StatusCode::TOO_MANY_REQUESTS,
                    ErrorCode::RateLimited,
                    RATE_LIMITED_MESSAGE,
                );
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, retry_after_secs.into());
                response
            }
            AppError::InvalidInput(msg) => {
                error_resp(StatusCode::BAD_REQUEST, ErrorCode::InvalidInput, &msg)
            }
            AppError::NotFound => error_resp(StatusCode::NOT_FOUND, ErrorCode::NotFound, "Not found"),
            AppError::Unauthorized(msg) => {
                error_resp(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, &msg)
            }
            AppError::UpstreamUnavailable(_) => error_resp(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::UpstreamUnavailable,
                PROCESSING_ERROR_MESSAGE,
            ),
            AppError::Configuration(_) => error_resp(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::ConfigurationError,
                PROCESSING_ERROR_MESSAGE,
            ),
            AppError::Internal(_) => error_resp(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::InternalError,
                PROCESSING_ERROR_MESSAGE,
            ),
        }
    }
}

fn error_resp(status: StatusCode, code: ErrorCode, message: &str) -> Response {
    let body = serde_json::json!({ "error": message, "code": code.as_str() });
    (status, Json(body)).into_response()
}
