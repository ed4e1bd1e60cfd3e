use crate::domain::detection::{Confidence, DetectionOutcome, Label, Verdict};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Ways a request can fail before a usable reply arrives.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Could not connect to server. Please make sure the server is running.")]
    ConnectionRefused(String),

    #[error("Server took too long to respond. Please try again.")]
    Timeout,

    #[error("Connection to the server was lost: {0}")]
    Disconnected(String),

    #[error("{detail}")]
    Server { status: u16, detail: String },

    #[error("Unexpected response from server: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::ConnectionRefused(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Disconnected(err.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadReply {
    result: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    prediction: Option<Label>,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    detail: String,
}

/// Interprets a `POST /upload` reply.
pub fn parse_reply(status: StatusCode, body: &str) -> Result<DetectionOutcome, TransportError> {
    if !status.is_success() {
        let detail = serde_json::from_str::<ErrorReply>(body)
            .map(|reply| reply.detail)
            .unwrap_or_else(|_| format!("Server error (Status: {})", status.as_u16()));
        return Err(TransportError::Server {
            status: status.as_u16(),
            detail,
        });
    }

    let reply: UploadReply = serde_json::from_str(body)
        .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

    match reply.prediction {
        Some(label) => {
            let confidence = reply
                .confidence
                .ok_or_else(|| TransportError::InvalidResponse("missing confidence".into()))
                .and_then(|value| {
                    Confidence::new(value)
                        .map_err(|e| TransportError::InvalidResponse(e.to_string()))
                })?;
            Ok(DetectionOutcome::Verdict(Verdict { label, confidence }))
        }
        None if reply.result.to_lowercase().contains("no face") => Ok(DetectionOutcome::NoFace),
        None => Err(TransportError::InvalidResponse(format!(
            "unrecognized result '{}'",
            reply.result
        ))),
    }
}

/// Thin HTTP client for `POST /upload`.
pub struct InferenceClient {
    http: reqwest::Client,
    upload_url: String,
}

impl InferenceClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            upload_url: format!("{}/upload", base_url.trim_end_matches('/')),
        })
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    pub async fn upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<DetectionOutcome, TransportError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.map_err(TransportError::from_reqwest)?;
        tracing::debug!(status = status.as_u16(), body = %body, "Server replied");

        parse_reply(status, &body)
    }
}
