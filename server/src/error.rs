use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use forwarder_core::{ErrorEnvelope, ForwardError};
use thiserror::Error;
use tracing::error;

use crate::generator::GenerationError;

/// Failures of the endpoints around the forwarder.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Text generation is not configured")]
    GenerationUnavailable,
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Forward(#[from] ForwardError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::GenerationUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Forward(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn envelope(&self) -> ErrorEnvelope {
        match self {
            ApiError::Forward(e) => ErrorEnvelope::from(e),
            other => ErrorEnvelope {
                success: false,
                error: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Generation(e) = &self {
            error!(error = %e, "text generation failed");
        }
        (self.status_code(), Json(self.envelope())).into_response()
    }
}
