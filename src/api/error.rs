// =============================================================================
// Ingestion error taxonomy (§3 Errors)
// =============================================================================
//
// Every ingestion endpoint fails with one of three typed errors. Validation
// and conflict failures are the caller's fault and are never retried; auth
// failures don't leak whether the account exists.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    AuthFailure(&'static str),
    ValidationFailure(String),
    ConflictFailure(String),
    Internal(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    reason: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, reason) = match self {
            ApiError::AuthFailure(reason) => (StatusCode::UNAUTHORIZED, "AuthFailure", reason.to_string()),
            ApiError::ValidationFailure(reason) => (StatusCode::BAD_REQUEST, "ValidationFailure", reason),
            ApiError::ConflictFailure(reason) => (StatusCode::CONFLICT, "ConflictFailure", reason),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "ingestion endpoint failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "internal error".to_string())
            }
        };
        (status, Json(ErrorBody { error: error.to_string(), reason })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
