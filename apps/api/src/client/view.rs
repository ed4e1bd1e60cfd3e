use super::http_client::TransportError;
use super::prevalidate::PrevalidationError;
use crate::domain::detection::{DetectionOutcome, FailureKind, Verdict};
use std::fmt;

/// What the client shows for one request. Exactly one state at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientView {
    Pending,
    NoFace,
    Verdict(Verdict),
    Failure { title: &'static str, message: String },
}

impl ClientView {
    pub fn from_outcome(outcome: DetectionOutcome) -> Self {
        match outcome {
            DetectionOutcome::NoFace => Self::NoFace,
            DetectionOutcome::Verdict(verdict) => Self::Verdict(verdict),
            DetectionOutcome::Failure { kind, message } => Self::Failure {
                title: match kind {
                    FailureKind::InputFormat => "Unsupported Image",
                    FailureKind::Timeout => "Timeout Error",
                    FailureKind::Decode | FailureKind::Internal => "Server Error",
                },
                message,
            },
        }
    }

    pub fn from_transport(err: &TransportError) -> Self {
        let title = match err {
            TransportError::ConnectionRefused(_) => "Connection Error",
            TransportError::Timeout => "Timeout Error",
            TransportError::Disconnected(_) => "Connection Lost",
            TransportError::Server { .. } => "Server Error",
            TransportError::InvalidResponse(_) => "Error",
        };
        Self::Failure {
            title,
            message: err.to_string(),
        }
    }

    pub fn from_prevalidation(err: &PrevalidationError) -> Self {
        match err {
            PrevalidationError::NoFace => Self::NoFace,
            PrevalidationError::UnsupportedExtension => Self::Failure {
                title: "Unsupported Image",
                message: err.to_string(),
            },
            PrevalidationError::Unreadable(_) => Self::Failure {
                title: "Error",
                message: err.to_string(),
            },
        }
    }

    pub fn from_result(result: Result<DetectionOutcome, TransportError>) -> Self {
        match result {
            Ok(outcome) => Self::from_outcome(outcome),
            Err(err) => Self::from_transport(&err),
        }
    }

    pub fn headline(&self) -> &str {
        match self {
            Self::Pending => "Analyzing image...",
            Self::NoFace => "No Face Detected",
            Self::Verdict(verdict) => verdict.label.display_name(),
            Self::Failure { title, .. } => *title,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Self::Pending => "Please wait".into(),
            Self::NoFace => "No face detected in the image. Please upload a clear face image.".into(),
            Self::Verdict(verdict) => format!("Confidence: {}", verdict.confidence.as_percentage()),
            Self::Failure { message, .. } => message.clone(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

impl fmt::Display for ClientView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.headline(), self.detail())
    }
}
