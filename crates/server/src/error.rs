//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::http::header::CONTENT_RANGE;
use axum::response::{IntoResponse, Response};
use reel_assembly::UploadError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl From<reel_core::Error> for ApiError {
    fn from(err: reel_core::Error) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

/// 425 Too Early: the artifact exists only once the session completes.
fn too_early() -> StatusCode {
    StatusCode::from_u16(425).unwrap_or(StatusCode::CONFLICT)
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
            Self::Upload(e) => e.code(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upload(e) => match e {
                UploadError::Validation(_) => StatusCode::BAD_REQUEST,
                UploadError::OwnershipMismatch { .. } => StatusCode::FORBIDDEN,
                UploadError::ChunkCountMismatch { .. }
                | UploadError::InvalidTransition { .. }
                | UploadError::SessionFailed { .. } => StatusCode::CONFLICT,
                UploadError::NotFound(_) => StatusCode::NOT_FOUND,
                UploadError::NotReady { .. } => too_early(),
                UploadError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
                UploadError::StorageFailure(_)
                | UploadError::MissingChunk { .. }
                | UploadError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }

        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };

        if let Self::Upload(UploadError::RangeNotSatisfiable { size }) = &self {
            let content_range = format!("bytes */{size}");
            return (status, [(CONTENT_RANGE, content_range)], Json(body)).into_response();
        }
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
