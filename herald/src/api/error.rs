//! API error handling.
//!
//! Every error leaves the API as `{"isOk": false, "code": ..., "error": ...}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Error;
use crate::queue::PublishError;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    #[serde(rename = "isOk")]
    pub is_ok: bool,
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub error: String,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            is_ok: false,
            code: self.code,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(msg) => ApiError::bad_request(msg),
            Error::Dispatch(e) => ApiError::bad_request(e.to_string()),
            Error::Serialization(e) => ApiError::bad_request(format!("Invalid JSON body: {e}")),
            _ => {
                tracing::error!("Unexpected error: {}", err);
                ApiError::internal("An unexpected error occurred")
            }
        }
    }
}

impl From<PublishError> for ApiError {
    fn from(err: PublishError) -> Self {
        ApiError::service_unavailable(err.to_string())
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_domain_error() {
        let api_err: ApiError = Error::validation("Error pass email param").into();
        assert_eq!(api_err.status, StatusCode::BAD_REQUEST);
        assert_eq!(api_err.message, "Error pass email param");

        let api_err: ApiError = Error::Other("boom".to_string()).into();
        assert_eq!(api_err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api_err.message.contains("boom"));
    }

    #[test]
    fn test_full_queue_is_unavailable() {
        let api_err: ApiError = PublishError::Full.into();
        assert_eq!(api_err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(api_err.code, "SERVICE_UNAVAILABLE");
    }

    #[test]
    fn test_response_body_shape() {
        let body = ApiErrorResponse {
            is_ok: false,
            code: "BAD_REQUEST".to_string(),
            error: "nope".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"isOk": false, "code": "BAD_REQUEST", "error": "nope"})
        );
    }
}
