use super::errors::DetectionError;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, ImageReader, Limits};
use std::io::Cursor;
use std::path::Path;

/// Extensions accepted on a declared filename (compared lowercase).
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

const SUPPORTED_FORMATS: [ImageFormat; 3] = [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::Bmp];

/// Largest width or height a payload may declare.
pub const MAX_IMAGE_SIDE: u32 = 8192;

/// Decoder allocation cap per image.
const MAX_DECODE_ALLOC: u64 = 256 * 1024 * 1024;

/// Decodes encoded image bytes under the service's dimension and memory
/// limits. Oversized or unreadable input is a decode failure.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, DetectionError> {
    if bytes.is_empty() {
        return Err(DetectionError::Decode("empty payload".into()));
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_SIDE);
    limits.max_image_height = Some(MAX_IMAGE_SIDE);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DetectionError::Decode(e.to_string()))?;
    reader.limits(limits);
    reader.decode().map_err(|e| DetectionError::Decode(e.to_string()))
}

/// Raw encoded image bytes for a single request.
///
/// The declared filename is only used to sniff the extension; it never
/// reaches the filesystem.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    bytes: Bytes,
    filename: Option<String>,
}

impl ImagePayload {
    pub fn new(bytes: impl Into<Bytes>, filename: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.filter(|name| !name.trim().is_empty()),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Rejects payloads whose declared extension or recognizable content is
    /// an image type the service does not accept.
    ///
    /// Content that matches no known signature passes this check and is left
    /// for [`ImagePayload::decode`] to reject as a decode failure.
    pub fn check_declared_format(&self) -> Result<(), DetectionError> {
        if let Some(extension) = self.declared_extension() {
            if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
                return Err(DetectionError::InputFormat(format!(
                    "File extension '.{}' is not supported",
                    extension
                )));
            }
        }

        if let Ok(format) = image::guess_format(&self.bytes) {
            if !SUPPORTED_FORMATS.contains(&format) {
                return Err(DetectionError::InputFormat(format!(
                    "Image format {:?} is not supported",
                    format
                )));
            }
        }

        Ok(())
    }

    pub fn decode(&self) -> Result<DynamicImage, DetectionError> {
        decode_image(&self.bytes)
    }

    fn declared_extension(&self) -> Option<String> {
        let name = self.filename.as_deref()?;
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}
