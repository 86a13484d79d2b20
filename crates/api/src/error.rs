//! API error responses
//!
//! Every error surfaces as the `{ "error": ..., "details": ... }` JSON shape
//! the clients expect, with the status code chosen by the error taxonomy:
//! validation problems are 4xx, infrastructure problems 5xx.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subwatch_notify::NotifyError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    /// Delivery failed or was queued for retry; the job row already records
    /// the state. Still an HTTP-level error per the worker contract.
    #[error("{error}")]
    DeliveryFailed { error: String, details: String },

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, message, None)
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".to_string(),
                None,
            ),
            ApiError::DeliveryFailed { error, details } => {
                (StatusCode::INTERNAL_SERVER_ERROR, error, Some(details))
            }
            ApiError::Notify(e) => {
                let status = match &e {
                    NotifyError::JobNotFound(_) | NotifyError::SubscriptionNotFound(_) => {
                        StatusCode::NOT_FOUND
                    }
                    NotifyError::Database(_) => {
                        tracing::error!(error = %e, "Storage failure handling request");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                    e if e.is_data_error() => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string(), None)
            }
        };

        let body = match details {
            Some(details) => serde_json::json!({ "error": error, "details": details }),
            None => serde_json::json!({ "error": error }),
        };
        (status, Json(body)).into_response()
    }
}
