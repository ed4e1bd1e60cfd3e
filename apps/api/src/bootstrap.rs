//! Startup wiring. Everything here runs before the listener binds, so any
//! error aborts the process without serving a request.

use crate::{
    application::classify_image::{ClassifyImageUseCase, InferencePipeline},
    config::Config,
    infrastructure::ml::{
        cascade_face_gate::FaceGateParams, onnx_classifier::OnnxClassifier, traits::FaceGate,
    },
    presentation::http::state::AppState,
};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;

/// Loads the face gate from an OpenCV cascade file. Builds with the `opencv`
/// feature run OpenCV's detector; others use the built-in cascade scan.
#[cfg(not(feature = "opencv"))]
pub fn load_face_gate(path: &Path, params: FaceGateParams) -> anyhow::Result<Arc<dyn FaceGate>> {
    use crate::infrastructure::ml::cascade_face_gate::CascadeFaceGate;
    Ok(Arc::new(CascadeFaceGate::load(path, params)?))
}

#[cfg(feature = "opencv")]
pub fn load_face_gate(path: &Path, params: FaceGateParams) -> anyhow::Result<Arc<dyn FaceGate>> {
    use crate::infrastructure::ml::opencv_face_gate::OpenCvFaceGate;
    Ok(Arc::new(OpenCvFaceGate::load(path, params)?))
}

/// Loads the classifier and the face cascade and builds the shared state.
pub fn build_state(config: Config) -> anyhow::Result<AppState> {
    let classifier = OnnxClassifier::load(&config.model_path)
        .context("Classifier model could not be loaded")?;
    let gate = load_face_gate(&config.cascade_path, config.face_gate_params())
        .context("Face cascade could not be loaded")?;

    let pipeline = InferencePipeline::new(gate, Arc::new(classifier));
    let classify = ClassifyImageUseCase::new(
        Arc::new(pipeline),
        config.max_concurrent_inferences,
        config.request_timeout(),
    );

    tracing::info!(
        max_concurrent = config.max_concurrent_inferences,
        timeout_secs = config.request_timeout_seconds,
        "Inference pipeline ready"
    );

    Ok(AppState {
        classify,
        config: Arc::new(config),
    })
}
