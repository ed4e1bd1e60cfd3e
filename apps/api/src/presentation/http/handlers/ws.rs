use crate::{
    application::classify_image::ClassifyImageUseCase,
    domain::detection::ImagePayload,
    presentation::http::{responses::StreamResponse, state::AppState},
};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Messages a client may send ahead while a request is in flight. A client
/// that exceeds it is disconnected.
pub const MAX_QUEUED_MESSAGES: usize = 16;

/// Why an inbound text message could not be turned into image bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Invalid JSON")]
    InvalidJson,
    #[error("No image data found")]
    MissingImage,
    #[error("Invalid base64 image data")]
    InvalidBase64,
}

/// Extracts the image bytes from `{"image": "<base64>"}` or
/// `{"data": "<base64>"}`. `image` wins when both are present, and a
/// `data:<mime>;base64,` prefix is stripped.
pub fn parse_envelope(text: &str) -> Result<Vec<u8>, EnvelopeError> {
    let value: Value = serde_json::from_str(text).map_err(|_| EnvelopeError::InvalidJson)?;

    let encoded = ["image", "data"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .ok_or(EnvelopeError::MissingImage)?;

    let encoded = match encoded.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, body)| body)
            .ok_or(EnvelopeError::InvalidBase64)?,
        None => encoded,
    };

    let cleaned: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(cleaned)
        .map_err(|_| EnvelopeError::InvalidBase64)
}

/// Handles one text message end to end and returns the reply to send.
pub async fn respond_to_message(classify: &ClassifyImageUseCase, text: &str) -> StreamResponse {
    match parse_envelope(text) {
        Ok(bytes) => {
            debug!(bytes = bytes.len(), "Decoded streaming request");
            StreamResponse::from(classify.execute(ImagePayload::new(bytes, None)).await)
        }
        Err(err) => {
            warn!(error = %err, "Rejected streaming request");
            StreamResponse::error(err.to_string())
        }
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let max_message_bytes = state.config.max_message_bytes();
    ws.max_message_size(max_message_bytes)
        .max_frame_size(max_message_bytes)
        .on_upgrade(move |socket| {
            let span = info_span!("ws", id = %Uuid::now_v7());
            handle_socket(socket, state).instrument(span)
        })
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("Client connected");
    let (mut sender, mut receiver) = socket.split();
    // Messages that arrived while an earlier request was in flight.
    let mut queued: VecDeque<Message> = VecDeque::new();

    loop {
        let message = match queued.pop_front() {
            Some(message) => message,
            None => match receiver.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket receive failed");
                    break;
                }
                None => break,
            },
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Binary(_) => {
                let reply = StreamResponse::error("Expected a text message");
                if sender.send(Message::Text(reply.to_json().into())).await.is_err() {
                    break;
                }
                continue;
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let work = respond_to_message(&state.classify, text.as_str());
        tokio::pin!(work);

        // Keep reading while the request runs so a disconnect cancels it.
        let reply = loop {
            tokio::select! {
                biased;
                reply = &mut work => break Some(reply),
                incoming = receiver.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None => break None,
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive failed");
                        break None;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(other)) if queued.len() < MAX_QUEUED_MESSAGES => queued.push_back(other),
                    Some(Ok(_)) => {
                        warn!(queued = queued.len(), "Too many queued messages, dropping client");
                        break None;
                    }
                },
            }
        };

        let Some(reply) = reply else {
            info!(dropped = queued.len(), "Client disconnected mid-request, abandoning it");
            return;
        };

        if sender.send(Message::Text(reply.to_json().into())).await.is_err() {
            break;
        }
    }

    info!("Client disconnected");
}
