use axum::{Json, http::StatusCode};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::estimator::EstimateError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn not_found(message: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Upstream failed and there is nothing cached to fall back on
pub fn upstream_unavailable(message: impl Into<String>) -> ApiError {
    let message = message.into();
    warn!(error = %message, "Upstream unavailable");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse { error: message }),
    )
}

impl From<EstimateError> for ErrorResponse {
    fn from(err: EstimateError) -> Self {
        ErrorResponse {
            error: err.to_string(),
        }
    }
}

pub fn estimate_error(err: EstimateError) -> ApiError {
    let status = match err {
        EstimateError::NotFound(_) => StatusCode::NOT_FOUND,
        EstimateError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
    };
    (status, Json(err.into()))
}
