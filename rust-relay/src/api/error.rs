//! HTTP error bodies.
//!
//! Every failed request answers with `{"code", "message", "details"?}`.
//! Supervisor errors map onto status codes in [`From<Error>`].

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Error;

/// JSON body of an error response.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Malformed request body or upload.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::Validation(msg) => Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            Error::Configuration(msg) | Error::Api(msg) => Self::bad_request(msg),
            Error::NoActiveSession => Self::new(StatusCode::CONFLICT, "NO_ACTIVE_SESSION", message),
            Error::MissingConfig(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "MISSING_CONFIG", message)
            }
            Error::Spawn { program, .. } => {
                tracing::error!(%program, "{}", message);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "SPAWN_ERROR", message)
                    .with_details(serde_json::json!({ "program": program }))
            }
            Error::SupervisorUnavailable => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "SUPERVISOR_UNAVAILABLE", message)
            }
            Error::Io(_) | Error::Other(_) => {
                tracing::error!("Request failed: {}", message);
                Self::internal(message)
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
