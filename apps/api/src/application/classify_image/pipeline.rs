use crate::domain::detection::{DetectionError, DetectionOutcome, ImagePayload};
use crate::infrastructure::ml::traits::{FaceGate, GatedImage, ImageClassifier};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Runs one image through format checks, the face gate and the classifier.
///
/// Built once at startup and shared by every transport. All calls are
/// synchronous and CPU bound; async callers go through
/// [`ClassifyImageUseCase`](super::use_case::ClassifyImageUseCase).
pub struct InferencePipeline {
    gate: Arc<dyn FaceGate>,
    classifier: Arc<dyn ImageClassifier>,
}

impl InferencePipeline {
    pub fn new(gate: Arc<dyn FaceGate>, classifier: Arc<dyn ImageClassifier>) -> Self {
        Self { gate, classifier }
    }

    pub fn model_loaded(&self) -> bool {
        self.classifier.is_loaded()
    }

    /// Produces exactly one outcome for the payload. Never panics on bad
    /// input; every failure is folded into `DetectionOutcome::Failure`.
    #[instrument(skip_all, fields(bytes = payload.len(), filename = ?payload.filename()))]
    pub fn detect(&self, payload: &ImagePayload) -> DetectionOutcome {
        match self.run(payload) {
            Ok(outcome) => outcome,
            Err(err) => {
                match &err {
                    DetectionError::Internal(_) => error!(error = %err, "Inference failed"),
                    _ => warn!(error = %err, "Rejected image"),
                }
                err.into()
            }
        }
    }

    fn run(&self, payload: &ImagePayload) -> Result<DetectionOutcome, DetectionError> {
        payload.check_declared_format()?;
        let image = payload.decode()?;

        let has_face = self.gate.check(&image).map_err(DetectionError::internal)?;
        if !has_face {
            info!("No face detected");
            return Ok(DetectionOutcome::NoFace);
        }

        let verdict = self
            .classifier
            .classify(&GatedImage::new(image))
            .map_err(DetectionError::internal)?;

        info!(
            label = %verdict.label,
            confidence = verdict.confidence.value(),
            "Image classified"
        );
        Ok(DetectionOutcome::Verdict(verdict))
    }
}
