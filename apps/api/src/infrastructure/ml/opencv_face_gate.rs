//! Face gate on OpenCV's own `CascadeClassifier`.
//!
//! Built with the `opencv` feature, which needs a system OpenCV with the
//! `objdetect` module. The cascade file and the scan parameters are the same
//! ones [`CascadeFaceGate`](super::cascade_face_gate::CascadeFaceGate) reads.

use super::cascade_face_gate::{FaceGateParams, scan_image};
use super::traits::FaceGate;
use anyhow::{Context, anyhow, bail, ensure};
use image::DynamicImage;
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, instrument};

pub struct OpenCvFaceGate {
    // detect_multi_scale takes &mut self.
    classifier: Mutex<CascadeClassifier>,
    params: FaceGateParams,
}

impl OpenCvFaceGate {
    pub fn load(path: impl AsRef<Path>, params: FaceGateParams) -> anyhow::Result<Self> {
        params.validate()?;

        let path = path.as_ref();
        if !path.exists() {
            bail!("Cascade file not found at {}", path.display());
        }
        let name = path
            .to_str()
            .ok_or_else(|| anyhow!("Cascade path {} is not valid UTF-8", path.display()))?;

        let classifier = CascadeClassifier::new(name)
            .with_context(|| format!("Invalid cascade file {}", path.display()))?;
        ensure!(
            !classifier.empty()?,
            "Invalid cascade file {}: no stages loaded",
            path.display()
        );
        tracing::info!(path = %path.display(), "OpenCV face cascade loaded");

        Ok(Self {
            classifier: Mutex::new(classifier),
            params,
        })
    }

    pub fn params(&self) -> FaceGateParams {
        self.params
    }
}

impl FaceGate for OpenCvFaceGate {
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn check(&self, image: &DynamicImage) -> anyhow::Result<bool> {
        let (gray, factor) = scan_image(image, self.params.max_side);
        let (min_width, min_height) = self.params.scan_min_size(factor);
        let (width, height) = gray.dimensions();
        let mat = Mat::new_rows_cols_with_data(height as i32, width as i32, gray.as_raw())?;

        let mut faces = Vector::<Rect>::new();
        let mut classifier = self
            .classifier
            .lock()
            .map_err(|_| anyhow!("Face cascade lock poisoned"))?;
        classifier.detect_multi_scale(
            &*mat,
            &mut faces,
            self.params.scale_factor,
            self.params.min_neighbors as i32,
            0,
            Size::new(min_width as i32, min_height as i32),
            Size::new(0, 0),
        )?;

        debug!(faces = faces.len(), "OpenCV face scan finished");
        Ok(!faces.is_empty())
    }
}
