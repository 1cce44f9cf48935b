/// Unified error handling module
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Unified error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("External API error: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("{source_name} responded with status {status}")]
    UpstreamStatus { source_name: String, status: u16 },

    #[error("{source_name} returned an unusable payload: {reason}")]
    UpstreamPayload { source_name: String, reason: String },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ApiError::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    /// Upstream unavailable: network, timeout, non-2xx or an unusable body
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ApiError::Upstream(_)
                | ApiError::UpstreamStatus { .. }
                | ApiError::UpstreamPayload { .. }
        )
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            ApiError::Upstream(e) if e.is_timeout() => {
                (StatusCode::BAD_GATEWAY, "UPSTREAM_TIMEOUT")
            }
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            ApiError::UpstreamStatus { status, .. } => (
                StatusCode::BAD_GATEWAY,
                match status {
                    403 => "UPSTREAM_403",
                    404 => "UPSTREAM_404",
                    429 => "UPSTREAM_429",
                    500..=599 => "UPSTREAM_5XX",
                    _ => "UPSTREAM_ERROR",
                },
            ),
            ApiError::UpstreamPayload { .. } => (StatusCode::BAD_GATEWAY, "UPSTREAM_INVALID"),
            ApiError::Cache(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CACHE_ERROR"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Cache(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Cache(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }

        let error_response = ErrorResponse {
            ok: false,
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };

        (status, Json(error_response)).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_is_client_error() {
        let resp = ApiError::invalid("lat query param is required").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_upstream_status_is_bad_gateway() {
        let err = ApiError::UpstreamStatus {
            source_name: "kp forecast".into(),
            status: 503,
        };
        assert!(err.is_upstream());
        assert_eq!(err.status_and_code(), (StatusCode::BAD_GATEWAY, "UPSTREAM_5XX"));
    }

    #[test]
    fn test_unusable_upstream_payload_is_bad_gateway() {
        let err = ApiError::UpstreamPayload {
            source_name: "NOAA SWPC".into(),
            reason: "no parsable Kp rows".into(),
        };
        assert!(err.is_upstream());
        assert_eq!(
            err.status_and_code(),
            (StatusCode::BAD_GATEWAY, "UPSTREAM_INVALID")
        );
        assert_eq!(
            err.to_string(),
            "NOAA SWPC returned an unusable payload: no parsable Kp rows"
        );
    }

    #[test]
    fn test_not_found() {
        let resp = ApiError::not_found("event").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
