use super::http_client::TransportError;
use crate::domain::detection::{Confidence, DetectionOutcome, FailureKind, Verdict};
use crate::presentation::http::responses::{NO_FACE_STREAM_ERROR, StreamResponse};
use anyhow::bail;
use base64::{Engine, engine::general_purpose::STANDARD};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::io::ErrorKind;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Error as WsError, tungstenite::Message};

/// Interprets one reply from the streaming endpoint.
pub fn parse_stream_reply(text: &str) -> Result<DetectionOutcome, TransportError> {
    let reply: StreamResponse =
        serde_json::from_str(text).map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

    match reply {
        StreamResponse::Prediction {
            prediction,
            confidence,
        } => {
            let confidence = Confidence::new(confidence)
                .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
            Ok(DetectionOutcome::Verdict(Verdict {
                label: prediction,
                confidence,
            }))
        }
        StreamResponse::Error { error } if error == NO_FACE_STREAM_ERROR => {
            Ok(DetectionOutcome::NoFace)
        }
        StreamResponse::Error { error } => Ok(DetectionOutcome::Failure {
            kind: failure_kind(&error),
            message: error,
        }),
    }
}

/// The streaming reply only carries a message, so the kind is read back
/// from the server's wording.
fn failure_kind(message: &str) -> FailureKind {
    if message.contains("took too long") {
        FailureKind::Timeout
    } else if message.contains("internal server error") {
        FailureKind::Internal
    } else if message.starts_with("Error processing image") {
        FailureKind::Decode
    } else {
        FailureKind::InputFormat
    }
}

fn transport_error(err: WsError) -> TransportError {
    match err {
        WsError::Io(e) if e.kind() == ErrorKind::ConnectionRefused => {
            TransportError::ConnectionRefused(e.to_string())
        }
        WsError::Http(response) => TransportError::Server {
            status: response.status().as_u16(),
            detail: format!(
                "Server refused the streaming connection (Status: {})",
                response.status().as_u16()
            ),
        },
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            TransportError::Disconnected("connection closed".into())
        }
        other => TransportError::Disconnected(other.to_string()),
    }
}

/// Client for the `/ws` streaming endpoint. Each call opens a connection,
/// sends one image and waits for its reply.
pub struct StreamClient {
    url: String,
    timeout: Duration,
}

impl StreamClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base = base_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            bail!("Unsupported server URL {}", base_url);
        };

        Ok(Self {
            url: format!("{}/ws", base),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn classify(&self, bytes: &[u8]) -> Result<DetectionOutcome, TransportError> {
        tokio::time::timeout(self.timeout, self.exchange(bytes))
            .await
            .map_err(|_| TransportError::Timeout)?
    }

    async fn exchange(&self, bytes: &[u8]) -> Result<DetectionOutcome, TransportError> {
        let (mut socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(transport_error)?;

        let envelope = json!({ "image": STANDARD.encode(bytes) }).to_string();
        socket
            .send(Message::text(envelope))
            .await
            .map_err(transport_error)?;

        let reply = loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => break parse_stream_reply(text.as_str()),
                Some(Ok(Message::Close(_))) | None => {
                    return Err(TransportError::Disconnected(
                        "server closed the connection before replying".into(),
                    ));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(transport_error(e)),
            }
        };
        tracing::debug!(?reply, "Streaming reply received");

        if let Err(e) = socket.close(None).await {
            tracing::debug!(error = %e, "Closing the streaming connection failed");
        }
        reply
    }
}
