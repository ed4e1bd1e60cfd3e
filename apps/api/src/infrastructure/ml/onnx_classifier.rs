use super::traits::{GatedImage, ImageClassifier};
use crate::domain::detection::{Confidence, Label, Verdict};
use anyhow::{Context, anyhow, bail, ensure};
use image::{DynamicImage, imageops::FilterType};
use ndarray::Array4;
use ort::{session::Session, value::Tensor};
use std::path::Path;
use std::sync::Mutex;

pub const INPUT_SIZE: u32 = 224;
/// Per-channel normalization used when the network was trained. Not tunable.
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Two-class classifier running an ONNX export of the trained network.
pub struct OnnxClassifier {
    // `Session::run` needs `&mut`; the lock serializes concurrent callers.
    session: Mutex<Session>,
}

impl OnnxClassifier {
    /// Loads the checkpoint. A missing or unreadable file is an error; the
    /// server treats it as fatal at startup.
    pub fn load(model_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            bail!("Model checkpoint not found at {}", model_path.display());
        }

        let session = Session::builder()?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load model from {}", model_path.display()))?;

        tracing::info!(path = %model_path.display(), "Classifier model loaded");
        Ok(Self {
            session: Mutex::new(session),
        })
    }

    fn run(&self, input: Array4<f32>) -> anyhow::Result<Vec<f32>> {
        let size = INPUT_SIZE as usize;
        let (data, _) = input.into_raw_vec_and_offset();
        let tensor = Tensor::from_array(([1usize, 3, size, size], data.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("Failed to acquire session lock"))?;
        let outputs = session.run(ort::inputs![tensor])?;
        let (_, logits) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(logits.to_vec())
    }
}

impl ImageClassifier for OnnxClassifier {
    fn classify(&self, image: &GatedImage) -> anyhow::Result<Verdict> {
        let logits = self.run(preprocess(image.image()))?;
        verdict_from_logits(&logits)
    }
}

/// Resize to 224x224, scale to [0, 1], normalize per channel. NCHW layout.
pub fn preprocess(image: &DynamicImage) -> Array4<f32> {
    let rgb = image
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
        .to_rgb8();
    let size = INPUT_SIZE as usize;
    let mut input = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            let value = f32::from(pixel[c]) / 255.0;
            input[[0, c, y as usize, x as usize]] = (value - CHANNEL_MEAN[c]) / CHANNEL_STD[c];
        }
    }

    input
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits
        .iter()
        .copied()
        .map(f64::from)
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&l| (f64::from(l) - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Arg-max label and its softmax probability.
pub fn verdict_from_logits(logits: &[f32]) -> anyhow::Result<Verdict> {
    ensure!(
        logits.len() == Label::CLASS_COUNT,
        "expected {} logits, got {}",
        Label::CLASS_COUNT,
        logits.len()
    );
    ensure!(
        logits.iter().all(|l| l.is_finite()),
        "model produced non-finite logits {:?}",
        logits
    );

    let probabilities = softmax(logits);
    let (index, probability) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });

    let label = Label::from_class_index(index)
        .ok_or_else(|| anyhow!("class index {} has no label", index))?;
    let confidence = Confidence::new(probability)?;

    Ok(Verdict { label, confidence })
}
