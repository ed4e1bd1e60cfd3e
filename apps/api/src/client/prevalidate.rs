use crate::infrastructure::ml::traits::FaceGate;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Extensions the client lets through before contacting the server.
pub const CLIENT_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrevalidationError {
    #[error("Please select a JPG, JPEG or PNG image.")]
    UnsupportedExtension,

    #[error("No face detected in the image. Please upload a clear face image.")]
    NoFace,

    #[error("Could not read the image: {0}")]
    Unreadable(String),
}

/// Local checks run before upload. Only saves a round trip; the server
/// repeats every check.
#[derive(Clone, Default)]
pub struct Prevalidator {
    gate: Option<Arc<dyn FaceGate>>,
}

impl Prevalidator {
    pub fn new(gate: Option<Arc<dyn FaceGate>>) -> Self {
        Self { gate }
    }

    pub fn check(&self, filename: &str, bytes: &[u8]) -> Result<(), PrevalidationError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or(PrevalidationError::UnsupportedExtension)?;
        if !CLIENT_EXTENSIONS.contains(&extension.as_str()) {
            return Err(PrevalidationError::UnsupportedExtension);
        }

        if let Some(gate) = &self.gate {
            let has_face = gate
                .check_bytes(bytes)
                .map_err(|e| PrevalidationError::Unreadable(e.to_string()))?;
            if !has_face {
                return Err(PrevalidationError::NoFace);
            }
        }

        Ok(())
    }
}
