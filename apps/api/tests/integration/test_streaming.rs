use super::helpers::{
    TestClassifier, TestGate, connect_socket, drain_texts, next_reply, serve, small_jpeg_bytes,
    small_png_bytes, spawn_app, spawn_app_with, spawn_faceless_app, test_config,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use futures_util::SinkExt;
use inference_api::application::classify_image::ClassifyImageUseCase;
use inference_api::domain::detection::Label;
use inference_api::presentation::http::handlers::ws::{parse_envelope, respond_to_message};
use serde_json::{Value, json};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

async fn reply(classify: &ClassifyImageUseCase, text: &str) -> Value {
    let response = respond_to_message(classify, text).await;
    serde_json::from_str(&response.to_json()).expect("reply is json")
}

#[tokio::test]
async fn image_key_yields_rounded_prediction() {
    let test = spawn_app();
    let text = json!({ "image": STANDARD.encode(small_jpeg_bytes()) }).to_string();

    assert_eq!(
        reply(&test.classify, &text).await,
        json!({"prediction": "drug_user", "confidence": 0.8732})
    );
}

#[tokio::test]
async fn data_key_is_handled_like_image_key() {
    let test = spawn_app();
    let encoded = STANDARD.encode(small_png_bytes());

    let via_image = reply(&test.classify, &json!({ "image": encoded }).to_string()).await;
    let via_data = reply(&test.classify, &json!({ "data": encoded }).to_string()).await;
    assert_eq!(via_image, via_data);
    assert_eq!(test.classifier.calls(), 2);
}

#[tokio::test]
async fn missing_image_keeps_channel_semantics() {
    let test = spawn_app();
    assert_eq!(
        reply(&test.classify, r#"{"hello": "world"}"#).await,
        json!({"error": "No image data found"})
    );
    assert_eq!(
        reply(&test.classify, "{{{").await,
        json!({"error": "Invalid JSON"})
    );
    assert_eq!(test.gate.calls(), 0);
}

#[tokio::test]
async fn no_face_uses_short_message() {
    let test = spawn_faceless_app();
    let text = json!({ "image": STANDARD.encode(small_jpeg_bytes()) }).to_string();

    assert_eq!(
        reply(&test.classify, &text).await,
        json!({"error": "No face detected in the image"})
    );
    assert_eq!(test.classifier.calls(), 0);
}

#[tokio::test]
async fn undecodable_bytes_produce_an_error_not_a_verdict() {
    let test = spawn_app();
    let text = json!({ "image": STANDARD.encode(b"plain text pretending to be a photo") }).to_string();

    let body = reply(&test.classify, &text).await;
    assert!(body.get("prediction").is_none());
    assert!(body["error"].as_str().unwrap().starts_with("Error processing image"));
}

#[test]
fn base64_envelope_round_trips_bytes_exactly() {
    let original = small_png_bytes();
    for key in ["image", "data"] {
        let text = json!({ key: STANDARD.encode(&original) }).to_string();
        assert_eq!(parse_envelope(&text).unwrap(), original);
    }

    let data_url = format!("data:image/png;base64,{}", STANDARD.encode(&original));
    let text = json!({ "image": data_url }).to_string();
    assert_eq!(parse_envelope(&text).unwrap(), original);
}

fn image_message(bytes: &[u8]) -> Message {
    Message::text(json!({ "image": STANDARD.encode(bytes) }).to_string())
}

#[tokio::test]
async fn one_connection_serves_many_requests_in_order() {
    let test = spawn_app();
    let base = serve(test.app.clone()).await;
    let mut socket = connect_socket(&base).await;
    let verdict = json!({"prediction": "drug_user", "confidence": 0.8732});

    socket.send(image_message(&small_jpeg_bytes())).await.unwrap();
    assert_eq!(next_reply(&mut socket).await, verdict);

    socket.send(Message::text(r#"{"x": 1}"#)).await.unwrap();
    assert_eq!(next_reply(&mut socket).await, json!({"error": "No image data found"}));

    socket.send(Message::text("nope")).await.unwrap();
    assert_eq!(next_reply(&mut socket).await, json!({"error": "Invalid JSON"}));

    let data = json!({ "data": STANDARD.encode(small_png_bytes()) }).to_string();
    socket.send(Message::text(data)).await.unwrap();
    assert_eq!(next_reply(&mut socket).await, verdict);

    socket.send(image_message(b"plain text pretending to be a photo")).await.unwrap();
    let reply = next_reply(&mut socket).await;
    assert!(reply["error"].as_str().unwrap().starts_with("Error processing image"));

    socket.send(Message::binary(vec![0xff, 0xd8, 0xff])).await.unwrap();
    assert_eq!(next_reply(&mut socket).await, json!({"error": "Expected a text message"}));

    assert_eq!(test.classifier.calls(), 2);
    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn messages_sent_ahead_are_answered_in_order() {
    let test = spawn_app_with(
        TestGate::new(true),
        TestClassifier::new(Label::DrugUser, 0.8732).slow(Duration::from_millis(200)),
        test_config(),
    );
    let base = serve(test.app.clone()).await;
    let mut socket = connect_socket(&base).await;

    socket.send(image_message(&small_jpeg_bytes())).await.unwrap();
    socket.send(Message::text("nope")).await.unwrap();
    socket.send(image_message(&small_png_bytes())).await.unwrap();

    assert_eq!(
        next_reply(&mut socket).await,
        json!({"prediction": "drug_user", "confidence": 0.8732})
    );
    assert_eq!(next_reply(&mut socket).await, json!({"error": "Invalid JSON"}));
    assert_eq!(
        next_reply(&mut socket).await,
        json!({"prediction": "drug_user", "confidence": 0.8732})
    );
    assert_eq!(test.classifier.calls(), 2);
}

#[tokio::test]
async fn disconnect_mid_request_gets_no_reply() {
    let test = spawn_app_with(
        TestGate::new(true),
        TestClassifier::new(Label::DrugUser, 0.8732).slow(Duration::from_millis(500)),
        test_config(),
    );
    let base = serve(test.app.clone()).await;
    let mut socket = connect_socket(&base).await;

    socket.send(image_message(&small_jpeg_bytes())).await.unwrap();
    socket.close(None).await.unwrap();

    assert!(drain_texts(&mut socket).await.is_empty());
}

#[tokio::test]
async fn close_after_a_queued_message_still_abandons_the_request() {
    let test = spawn_app_with(
        TestGate::new(true),
        TestClassifier::new(Label::DrugUser, 0.8732).slow(Duration::from_millis(500)),
        test_config(),
    );
    let base = serve(test.app.clone()).await;
    let mut socket = connect_socket(&base).await;

    socket.send(image_message(&small_jpeg_bytes())).await.unwrap();
    socket.send(image_message(&small_png_bytes())).await.unwrap();
    socket.close(None).await.unwrap();

    assert!(drain_texts(&mut socket).await.is_empty());
    // Only the first request reached the classifier; the queued one was dropped.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(test.classifier.calls(), 1);
}

#[tokio::test]
async fn oversized_message_closes_the_connection() {
    let mut config = test_config();
    config.max_upload_bytes = 1000;
    let test = spawn_app_with(
        TestGate::new(true),
        TestClassifier::new(Label::DrugUser, 0.8732),
        config,
    );
    let base = serve(test.app.clone()).await;
    let mut socket = connect_socket(&base).await;

    socket.send(image_message(&[7u8; 10_000])).await.unwrap();

    assert!(drain_texts(&mut socket).await.is_empty());
    assert_eq!(test.gate.calls(), 0);
}
