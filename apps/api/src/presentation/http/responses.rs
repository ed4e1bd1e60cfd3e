//! Wire shapes for both transports. Built from a `DetectionOutcome` only at
//! the presentation boundary.

use super::errors::AppError;
use crate::domain::detection::{DetectionOutcome, Label};
use serde::{Deserialize, Serialize};

pub const NO_FACE_RESULT: &str = "No face detected";
pub const NO_FACE_UPLOAD_ERROR: &str =
    "No face detected in the image. Please upload a clear face image.";
pub const NO_FACE_STREAM_ERROR: &str = "No face detected in the image";

/// 200 body of `POST /upload`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResponse {
    pub result: &'static str,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Label>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

impl TryFrom<DetectionOutcome> for UploadResponse {
    type Error = AppError;

    fn try_from(outcome: DetectionOutcome) -> Result<Self, Self::Error> {
        match outcome {
            DetectionOutcome::NoFace => Ok(Self {
                result: NO_FACE_RESULT,
                confidence: 0.0,
                prediction: None,
                error: Some(NO_FACE_UPLOAD_ERROR),
            }),
            DetectionOutcome::Verdict(verdict) => Ok(Self {
                result: verdict.label.display_name(),
                confidence: verdict.confidence.value(),
                prediction: Some(verdict.label),
                error: None,
            }),
            DetectionOutcome::Failure { kind, message } => {
                Err(AppError::from_failure(kind, message))
            }
        }
    }
}

/// Reply to one streaming request. The streaming client reads the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamResponse {
    Prediction { prediction: Label, confidence: f64 },
    Error { error: String },
}

impl StreamResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing a flat struct of strings and floats cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"error":"Serialization failed"}"#.into())
    }
}

impl From<DetectionOutcome> for StreamResponse {
    fn from(outcome: DetectionOutcome) -> Self {
        match outcome {
            DetectionOutcome::NoFace => Self::error(NO_FACE_STREAM_ERROR),
            DetectionOutcome::Verdict(verdict) => Self::Prediction {
                prediction: verdict.label,
                confidence: verdict.confidence.rounded(),
            },
            DetectionOutcome::Failure { message, .. } => Self::error(message),
        }
    }
}
