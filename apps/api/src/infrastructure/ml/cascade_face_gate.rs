use super::haar_cascade::{HaarCascade, ScanTables};
use super::rect_grouping::{GROUP_EPS, Region, group_regions};
use super::traits::FaceGate;
use anyhow::ensure;
use image::{DynamicImage, GrayImage};
use std::path::Path;
use tracing::{debug, instrument};

/// Longest side of the image a scan runs on unless configured otherwise.
pub const DEFAULT_SCAN_MAX_SIDE: u32 = 1024;

/// Upper bound for `max_side`; keeps the `u32` summed-area tables from
/// overflowing.
pub const SCAN_MAX_SIDE_LIMIT: u32 = 2048;

const SCAN_MIN_SIDE: u32 = 64;

/// Sensitivity knobs of the multi-scale face scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceGateParams {
    /// Growth of the detection window between pyramid levels. Must exceed 1.
    pub scale_factor: f64,
    /// A face needs strictly more than this many overlapping raw hits.
    pub min_neighbors: u32,
    /// Smallest window scanned, in input-image pixels.
    pub min_width: u32,
    pub min_height: u32,
    /// Inputs whose longest side exceeds this are scanned on a downscaled copy.
    pub max_side: u32,
}

impl Default for FaceGateParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 5,
            min_width: 60,
            min_height: 60,
            max_side: DEFAULT_SCAN_MAX_SIDE,
        }
    }
}

impl FaceGateParams {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.scale_factor.is_finite() && self.scale_factor > 1.0,
            "face scale factor must be greater than 1.0, got {}",
            self.scale_factor
        );
        ensure!(
            self.min_width > 0 && self.min_height > 0,
            "minimum face size must be positive, got {}x{}",
            self.min_width,
            self.min_height
        );
        ensure!(
            (SCAN_MIN_SIDE..=SCAN_MAX_SIDE_LIMIT).contains(&self.max_side),
            "face scan side must be between {} and {}, got {}",
            SCAN_MIN_SIDE,
            SCAN_MAX_SIDE_LIMIT,
            self.max_side
        );
        Ok(())
    }

    /// Minimum face size in scan pixels for a scan downscaled by `factor`.
    pub fn scan_min_size(&self, factor: f64) -> (u32, u32) {
        let down = |v: u32| ((f64::from(v) / factor).round() as u32).max(1);
        (down(self.min_width), down(self.min_height))
    }
}

/// Grayscale copy of `image` with its longest side at most `max_side`, and
/// the factor that maps scan pixels back to input pixels.
pub fn scan_image(image: &DynamicImage, max_side: u32) -> (GrayImage, f64) {
    let longest = image.width().max(image.height());
    if longest <= max_side {
        return (image.to_luma8(), 1.0);
    }

    let reduced = image.thumbnail(max_side, max_side);
    let factor = f64::from(longest) / f64::from(reduced.width().max(reduced.height()));
    (reduced.to_luma8(), factor)
}

/// Face gate backed by a Viola-Jones Haar cascade.
pub struct CascadeFaceGate {
    cascade: HaarCascade,
    params: FaceGateParams,
}

impl CascadeFaceGate {
    pub fn new(cascade: HaarCascade, params: FaceGateParams) -> anyhow::Result<Self> {
        params.validate()?;
        Ok(Self { cascade, params })
    }

    pub fn load(path: impl AsRef<Path>, params: FaceGateParams) -> anyhow::Result<Self> {
        let cascade = HaarCascade::load(path)?;
        tracing::info!(
            stages = cascade.stage_count(),
            features = cascade.feature_count(),
            "Face cascade loaded"
        );
        Self::new(cascade, params)
    }

    pub fn params(&self) -> FaceGateParams {
        self.params
    }

    /// Face regions found in an image, in input pixel units.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn detect(&self, image: &DynamicImage) -> Vec<Region> {
        let (gray, factor) = scan_image(image, self.params.max_side);
        let faces = self.scan(&gray, factor);
        faces.iter().map(|face| face.upscaled(factor)).collect()
    }

    fn scan(&self, gray: &GrayImage, factor: f64) -> Vec<Region> {
        let (image_width, image_height) = gray.dimensions();
        let (base_width, base_height) = self.cascade.window_size();
        let (min_width, min_height) = self.params.scan_min_size(factor);
        let tables = ScanTables::new(gray);

        let mut hits = Vec::new();
        let mut scale = 1.0f64;
        loop {
            let window_width = (f64::from(base_width) * scale).round() as u32;
            let window_height = (f64::from(base_height) * scale).round() as u32;
            if window_width > image_width || window_height > image_height {
                break;
            }

            if window_width >= min_width && window_height >= min_height {
                let level = self.cascade.scaled(scale);
                let step = ((if scale > 2.0 { 1.0 } else { 2.0 }) * scale).round().max(1.0) as u32;

                let mut y = 0;
                while y + window_height <= image_height {
                    let mut x = 0;
                    while x + window_width <= image_width {
                        if level.accepts(&tables, x, y) {
                            hits.push(Region::new(x, y, window_width, window_height));
                        }
                        x += step;
                    }
                    y += step;
                }
            }

            scale *= self.params.scale_factor;
        }

        let faces = group_regions(&hits, self.params.min_neighbors, GROUP_EPS);
        debug!(
            scan_width = image_width,
            scan_height = image_height,
            raw_hits = hits.len(),
            faces = faces.len(),
            "Face scan finished"
        );
        faces
    }
}

impl FaceGate for CascadeFaceGate {
    fn check(&self, image: &DynamicImage) -> anyhow::Result<bool> {
        Ok(!self.detect(image).is_empty())
    }
}
