use super::errors::DetectionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classifier label.
///
/// The class-index mapping is fixed by how the model was trained:
/// index 0 is `DrugUser`, index 1 is `NotUser`. Serving must never
/// reorder it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    DrugUser,
    NotUser,
}

impl Label {
    pub const CLASS_COUNT: usize = 2;

    pub fn from_class_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::DrugUser),
            1 => Some(Self::NotUser),
            _ => None,
        }
    }

    /// Machine-readable wire value (`prediction` field).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DrugUser => "drug_user",
            Self::NotUser => "not_user",
        }
    }

    /// Human-readable wire value (`result` field).
    pub fn display_name(self) -> &'static str {
        match self {
            Self::DrugUser => "Drug User",
            Self::NotUser => "Not a Drug User",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Softmax probability of the predicted class, always within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    pub const ZERO: Confidence = Confidence(0.0);

    pub fn new(value: f64) -> Result<Self, DetectionError> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(DetectionError::internal(anyhow::anyhow!(
                "confidence {} outside [0, 1]",
                value
            )))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Value rounded to four decimals, as sent on the streaming transport.
    pub fn rounded(self) -> f64 {
        (self.0 * 10_000.0).round() / 10_000.0
    }

    /// Percentage with two decimals, e.g. `87.32%`.
    pub fn as_percentage(self) -> String {
        format!("{:.2}%", self.0 * 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub label: Label,
    pub confidence: Confidence,
}

/// Category of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Declared extension or sniffed content is not a supported image type.
    InputFormat,
    /// Bytes could not be parsed as an image.
    Decode,
    /// Unexpected gate or classifier failure. Details stay in the server log.
    Internal,
    /// The per-request deadline elapsed before a result was produced.
    Timeout,
}

/// Result of one request through the face gate and classifier.
///
/// Exactly one variant per request. `Verdict` is only reachable after the
/// face gate passed.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    NoFace,
    Verdict(Verdict),
    Failure { kind: FailureKind, message: String },
}

impl DetectionOutcome {
    pub fn confidence(&self) -> Confidence {
        match self {
            Self::Verdict(verdict) => verdict.confidence,
            Self::NoFace | Self::Failure { .. } => Confidence::ZERO,
        }
    }

    pub fn label(&self) -> Option<Label> {
        match self {
            Self::Verdict(verdict) => Some(verdict.label),
            Self::NoFace | Self::Failure { .. } => None,
        }
    }

    pub fn is_verdict(&self) -> bool {
        matches!(self, Self::Verdict(_))
    }
}

impl From<DetectionError> for DetectionOutcome {
    fn from(err: DetectionError) -> Self {
        Self::Failure {
            kind: err.kind(),
            message: err.user_message(),
        }
    }
}
