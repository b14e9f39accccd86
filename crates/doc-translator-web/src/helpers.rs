//! Helper types and traits for cleaner route handlers.
//!
//! Every JSON body carries `success` and `timestamp`. Failures are reported
//! through [`ApiError`], which also carries the machine-readable `errorType`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use doc_translator_core::Error;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, warn};

/// Standard result type for route handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// An error response: `{success: false, message, errorType, timestamp}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error_type: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, error_type: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_type,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }
}

/// HTTP status for a core error.
pub const fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::UnsupportedFormat(_) | Error::InvalidRequest(_) | Error::JobNotReady(_) => {
            StatusCode::BAD_REQUEST
        }
        Error::JobNotFound(_) => StatusCode::NOT_FOUND,
        Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        Error::UploadTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
        Error::ExtractionFailed(_) | Error::PdfOpen(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!("Request failed: {}", err);
        } else {
            warn!("Request rejected: {}", err);
        }
        Self::new(status, err.kind(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "message": self.message,
            "errorType": self.error_type,
            "timestamp": timestamp(),
        });
        (self.status, Json(body)).into_response()
    }
}

pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Serialize `body` and add `success: true` and `timestamp` to it.
pub fn success<T: Serialize>(body: &T) -> ApiResult<Json<Value>> {
    let mut value = serde_json::to_value(body).or_internal_error()?;
    if let Value::Object(map) = &mut value {
        map.insert("success".to_string(), Value::Bool(true));
        map.insert("timestamp".to_string(), Value::String(timestamp()));
    }
    Ok(Json(value))
}

/// Extension trait for converting `Option<T>` to `ApiResult<T>`.
///
/// Provides convenient methods for returning 404 Not Found when
/// an expected resource (like a job) doesn't exist.
pub trait OptionExt<T> {
    /// Returns the contained value or a 404 Not Found error.
    fn or_not_found(self, msg: &str) -> ApiResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, msg: &str) -> ApiResult<T> {
        self.ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "job_not_found", msg))
    }
}

/// Extension trait for converting `Result<T, E>` to `ApiResult<T>`.
pub trait ResultExt<T, E: std::fmt::Display> {
    /// Converts the error to 500 Internal Server Error.
    fn or_internal_error(self) -> ApiResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T, E> for Result<T, E> {
    fn or_internal_error(self) -> ApiResult<T> {
        self.map_err(|e| {
            error!("Internal error: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string())
        })
    }
}
