use crate::domain::detection::{DetectionError, Verdict, decode_image};
use image::DynamicImage;

/// Decides whether an image contains at least one plausible human face.
#[cfg_attr(test, mockall::automock)]
pub trait FaceGate: Send + Sync {
    /// Pass/fail on an already decoded image.
    fn check(&self, image: &DynamicImage) -> anyhow::Result<bool>;

    /// Pass/fail on encoded bytes. Unreadable input is a decode failure,
    /// never a silent `false`.
    fn check_bytes(&self, bytes: &[u8]) -> Result<bool, DetectionError> {
        let image = decode_image(bytes)?;
        self.check(&image).map_err(DetectionError::internal)
    }
}

/// Two-class image classifier.
#[cfg_attr(test, mockall::automock)]
pub trait ImageClassifier: Send + Sync {
    fn classify(&self, image: &GatedImage) -> anyhow::Result<Verdict>;

    /// Whether the underlying model finished loading.
    fn is_loaded(&self) -> bool {
        true
    }
}

/// A decoded image that has passed the face gate.
///
/// Only the inference pipeline constructs these, so a classifier can never
/// be handed an image that skipped the gate.
#[derive(Debug)]
pub struct GatedImage(DynamicImage);

impl GatedImage {
    pub(crate) fn new(image: DynamicImage) -> Self {
        Self(image)
    }

    pub fn image(&self) -> &DynamicImage {
        &self.0
    }
}
