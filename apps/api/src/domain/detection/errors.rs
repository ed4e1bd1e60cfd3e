use super::outcome::FailureKind;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while turning an upload into a `DetectionOutcome`.
///
/// `Display` carries the full detail for server logs. What the client sees
/// comes from [`DetectionError::user_message`], which never includes
/// internal error chains.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Unsupported input format: {0}")]
    InputFormat(String),

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("Internal error: {0:#}")]
    Internal(#[source] anyhow::Error),

    #[error("Request exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

impl DetectionError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InputFormat(_) => FailureKind::InputFormat,
            Self::Decode(_) => FailureKind::Decode,
            Self::Internal(_) => FailureKind::Internal,
            Self::DeadlineExceeded(_) => FailureKind::Timeout,
        }
    }

    /// Client-safe message.
    pub fn user_message(&self) -> String {
        match self {
            Self::InputFormat(reason) => format!(
                "{}. Please upload a JPG, JPEG, PNG or BMP image.",
                reason
            ),
            Self::Decode(_) => "Error processing image: the file is not a readable image".into(),
            Self::Internal(_) => "Error processing image: internal server error".into(),
            Self::DeadlineExceeded(_) => {
                "Error processing image: the request took too long to complete".into()
            }
        }
    }
}
