//! HTTP error handling and response conversion.
//!
//! Failures are mapped to a status code and a `{"detail": "..."}` body. The
//! `Display` form keeps internal detail for the server log; the body only
//! ever carries the user-safe message.

use crate::domain::detection::{DetectionError, FailureKind};
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Errors returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Missing form field or unreadable multipart body (400).
    BadRequest(String),

    /// Declared or sniffed type is not a supported image (415).
    UnsupportedMediaType(String),

    /// Bytes are not a readable image (500).
    Decode(String),

    /// Per-request deadline elapsed (504).
    Timeout(String),

    /// Gate, classifier or runtime failure (500).
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            Self::UnsupportedMediaType(msg) => write!(f, "Unsupported media type: {}", msg),
            Self::Decode(msg) => write!(f, "Decode error: {}", msg),
            Self::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl AppError {
    /// Maps a failed pipeline outcome to an HTTP error.
    pub fn from_failure(kind: FailureKind, message: String) -> Self {
        match kind {
            FailureKind::InputFormat => Self::UnsupportedMediaType(message),
            FailureKind::Decode => Self::Decode(message),
            FailureKind::Timeout => Self::Timeout(message),
            FailureKind::Internal => Self::Internal(message),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Decode(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// User-safe message. Pipeline failures already carry one.
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest(msg)
            | Self::UnsupportedMediaType(msg)
            | Self::Decode(msg)
            | Self::Timeout(msg)
            | Self::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.user_message();

        match status {
            StatusCode::INTERNAL_SERVER_ERROR | StatusCode::GATEWAY_TIMEOUT => {
                tracing::error!("error={}", self);
            }
            StatusCode::BAD_REQUEST | StatusCode::UNSUPPORTED_MEDIA_TYPE => {
                tracing::warn!("error={}", self);
            }
            _ => {
                tracing::info!("error={}", self);
            }
        }

        (status, Json(json!({ "detail": message }))).into_response()
    }
}

impl From<DetectionError> for AppError {
    fn from(err: DetectionError) -> Self {
        Self::from_failure(err.kind(), err.user_message())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        tracing::warn!(multipart_error = %err, "Unreadable multipart body");
        AppError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}
