//! # HTTP Error Handling
//!
//! Errors returned by request handlers, converted into JSON responses.
//!
//! ## JSON Response Format:
//! All errors return JSON with a consistent structure:
//! ```json
//! {
//!   "error": {
//!     "type": "service_unavailable",
//!     "message": "session controller is not running",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```
//!
//! ## HTTP Status Code Mapping:
//! - Internal/ConfigError → 500 (Internal Server Error)
//! - BadRequest → 400 (Bad Request)
//! - Unavailable → 503 (Service Unavailable)

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Server-side failure with no better classification
    #[error("Internal error: {0}")]
    Internal(String),

    /// Client sent invalid or malformed data
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The session controller has stopped and cannot take commands
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Configuration file or environment variable problems
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    fn error_type(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unavailable(_) => "service_unavailable",
            AppError::ConfigError(_) => "config_error",
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::Internal(msg)
            | AppError::BadRequest(msg)
            | AppError::Unavailable(msg)
            | AppError::ConfigError(msg) => msg,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.error_type(),
                "message": self.message(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are almost always the client's fault.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn test_error_body_shape() {
        let response = AppError::Unavailable("controller stopped".into()).error_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "service_unavailable");
        assert_eq!(json["error"]["message"], "controller stopped");
        assert!(json["error"]["timestamp"].is_string());
    }

    #[test]
    fn test_json_errors_are_bad_requests() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
