//! Service configuration loaded from environment variables.
//!
//! Values are read once at startup (after `dotenvy` has merged a local `.env`
//! file). Every variable is optional; a value that is set but cannot be parsed
//! or is out of range aborts startup with an error naming the variable.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Logging filter (default: "info,inference_api=debug,tower_http=debug")
//! - `HOST`: Bind address (default: "0.0.0.0")
//! - `PORT`: Bind port (default: 8000)
//! - `MODEL_PATH`: ONNX classifier checkpoint (default: "./models/classifier.onnx")
//! - `CASCADE_PATH`: Haar cascade XML (default: "./models/haarcascade_frontalface_default.xml")
//! - `FACE_SCALE_FACTOR`: Window growth per scan level, > 1 (default: 1.1)
//! - `FACE_MIN_NEIGHBORS`: Overlapping hits a face needs to exceed (default: 5)
//! - `FACE_MIN_SIZE`: Smallest face side in pixels (default: 60)
//! - `FACE_SCAN_MAX_SIDE`: Longer images are scanned on a downscaled copy, 64..=2048 (default: 1024)
//! - `MAX_CONCURRENT_INFERENCES`: Parallel pipeline runs (default: available cores)
//! - `REQUEST_TIMEOUT_SECONDS`: Per-request deadline (default: 30)
//! - `MAX_UPLOAD_BYTES`: Request body limit; also bounds streaming messages (default: 20 MiB)
//! - `CORS_ALLOWED_ORIGINS`: Comma-separated origins; empty allows any origin

use crate::infrastructure::ml::cascade_face_gate::{
    DEFAULT_SCAN_MAX_SIDE, FaceGateParams, SCAN_MAX_SIDE_LIMIT,
};
use anyhow::{anyhow, ensure};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// ONNX export of the two-class network.
    pub model_path: PathBuf,

    /// OpenCV-format frontal face cascade.
    pub cascade_path: PathBuf,

    pub face_scale_factor: f64,
    pub face_min_neighbors: u32,
    pub face_min_size: u32,
    pub face_scan_max_side: u32,

    /// Upper bound on pipeline runs executing at once across all connections.
    pub max_concurrent_inferences: usize,

    pub request_timeout_seconds: u64,
    pub max_upload_bytes: usize,

    /// Empty means any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_source<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_parallelism = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1);

        let config = Self {
            host: env_or(&lookup, "HOST", "0.0.0.0".to_string())?,
            port: env_or(&lookup, "PORT", 8000)?,
            model_path: env_or(&lookup, "MODEL_PATH", PathBuf::from("./models/classifier.onnx"))?,
            cascade_path: env_or(
                &lookup,
                "CASCADE_PATH",
                PathBuf::from("./models/haarcascade_frontalface_default.xml"),
            )?,
            face_scale_factor: env_or(&lookup, "FACE_SCALE_FACTOR", 1.1)?,
            face_min_neighbors: env_or(&lookup, "FACE_MIN_NEIGHBORS", 5)?,
            face_min_size: env_or(&lookup, "FACE_MIN_SIZE", 60)?,
            face_scan_max_side: env_or(&lookup, "FACE_SCAN_MAX_SIDE", DEFAULT_SCAN_MAX_SIDE)?,
            max_concurrent_inferences: env_or(
                &lookup,
                "MAX_CONCURRENT_INFERENCES",
                default_parallelism,
            )?,
            request_timeout_seconds: env_or(&lookup, "REQUEST_TIMEOUT_SECONDS", 30)?,
            max_upload_bytes: env_or(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.face_scale_factor.is_finite() && self.face_scale_factor > 1.0,
            "FACE_SCALE_FACTOR must be greater than 1.0, got {}",
            self.face_scale_factor
        );
        ensure!(self.face_min_size >= 1, "FACE_MIN_SIZE must be at least 1");
        ensure!(
            (64..=SCAN_MAX_SIDE_LIMIT).contains(&self.face_scan_max_side),
            "FACE_SCAN_MAX_SIDE must be between 64 and {}, got {}",
            SCAN_MAX_SIDE_LIMIT,
            self.face_scan_max_side
        );
        ensure!(
            self.max_concurrent_inferences >= 1,
            "MAX_CONCURRENT_INFERENCES must be at least 1"
        );
        ensure!(
            self.request_timeout_seconds >= 1,
            "REQUEST_TIMEOUT_SECONDS must be at least 1"
        );
        ensure!(self.max_upload_bytes >= 1, "MAX_UPLOAD_BYTES must be at least 1");
        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow!("Invalid HOST/PORT {}:{}: {}", self.host, self.port, e))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Largest streaming message accepted: a base64 image of
    /// `max_upload_bytes` plus room for the JSON envelope.
    pub fn max_message_bytes(&self) -> usize {
        (self.max_upload_bytes / 3 + 1)
            .saturating_mul(4)
            .saturating_add(1024)
    }

    pub fn face_gate_params(&self) -> FaceGateParams {
        FaceGateParams {
            scale_factor: self.face_scale_factor,
            min_neighbors: self.face_min_neighbors,
            min_width: self.face_min_size,
            min_height: self.face_min_size,
            max_side: self.face_scan_max_side,
        }
    }
}

/// Parses `key` if present, otherwise returns `default`.
fn env_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(val) => val
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Failed to parse {}: {}", key, e)),
        None => Ok(default),
    }
}
