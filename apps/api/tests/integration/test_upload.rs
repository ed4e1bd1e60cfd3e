use super::helpers::{
    TestClassifier, TestGate, assert_status, expect_status, read_json, send, small_jpeg_bytes,
    small_png_bytes, spawn_app, spawn_app_with, spawn_faceless_app, test_config, upload_request,
};
use axum::http::StatusCode;
use inference_api::domain::detection::Label;
use serde_json::{Value, json};
use std::time::Duration;

#[tokio::test]
async fn face_image_returns_verdict() {
    let test = spawn_app();
    let res = send(&test.app, upload_request("file", "face.jpg", &small_jpeg_bytes())).await;
    let res = expect_status(res, StatusCode::OK).await;

    let body: Value = read_json(res).await;
    assert_eq!(
        body,
        json!({"result": "Drug User", "confidence": 0.8732, "prediction": "drug_user"})
    );
    assert_eq!(test.gate.calls(), 1);
    assert_eq!(test.classifier.calls(), 1);
}

#[tokio::test]
async fn not_user_verdict_uses_readable_result() {
    let test = spawn_app_with(
        TestGate::new(true),
        TestClassifier::new(Label::NotUser, 0.91),
        test_config(),
    );
    let res = send(&test.app, upload_request("file", "face.png", &small_png_bytes())).await;
    let body: Value = read_json(expect_status(res, StatusCode::OK).await).await;

    assert_eq!(body["result"], "Not a Drug User");
    assert_eq!(body["prediction"], "not_user");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn blank_wall_reports_no_face_without_classifying() {
    let test = spawn_faceless_app();
    let res = send(&test.app, upload_request("file", "wall.jpg", &small_jpeg_bytes())).await;
    let body: Value = read_json(expect_status(res, StatusCode::OK).await).await;

    assert_eq!(
        body,
        json!({
            "result": "No face detected",
            "confidence": 0.0,
            "error": "No face detected in the image. Please upload a clear face image."
        })
    );
    assert_eq!(test.classifier.calls(), 0);
}

#[tokio::test]
async fn text_file_renamed_to_jpg_is_a_server_error() {
    let test = spawn_app();
    let res = send(
        &test.app,
        upload_request("file", "notes.jpg", b"Dear diary, today I renamed a file."),
    )
    .await;
    let res = expect_status(res, StatusCode::INTERNAL_SERVER_ERROR).await;

    let body: Value = read_json(res).await;
    assert!(body["detail"].as_str().unwrap().starts_with("Error processing image"));
    assert!(body.get("prediction").is_none());
    assert_eq!(test.gate.calls(), 0);
    assert_eq!(test.classifier.calls(), 0);
}

#[tokio::test]
async fn unsupported_extension_is_415() {
    let test = spawn_app();
    let res = send(&test.app, upload_request("file", "face.gif", &small_png_bytes())).await;
    let res = expect_status(res, StatusCode::UNSUPPORTED_MEDIA_TYPE).await;

    let body: Value = read_json(res).await;
    assert!(body["detail"].as_str().unwrap().contains("JPG"));
}

#[tokio::test]
async fn missing_file_field_is_400() {
    let test = spawn_app();
    let res = send(&test.app, upload_request("image", "face.jpg", &small_jpeg_bytes())).await;
    assert_status(res.status(), StatusCode::BAD_REQUEST);

    let body: Value = read_json(res).await;
    assert!(body["detail"].as_str().unwrap().contains("file"));
}

#[tokio::test]
async fn slow_inference_hits_the_deadline() {
    let mut config = test_config();
    config.request_timeout_seconds = 1;
    let test = spawn_app_with(
        TestGate::new(true),
        TestClassifier::new(Label::DrugUser, 0.7).slow(Duration::from_millis(1500)),
        config,
    );

    let res = send(&test.app, upload_request("file", "face.jpg", &small_jpeg_bytes())).await;
    assert_status(res.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn same_bytes_give_same_answer() {
    let test = spawn_app();
    let bytes = small_png_bytes();

    let first: Value = read_json(send(&test.app, upload_request("file", "a.png", &bytes)).await).await;
    let second: Value = read_json(send(&test.app, upload_request("file", "a.png", &bytes)).await).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn responses_carry_security_headers_and_request_id() {
    let test = spawn_app();
    let res = send(&test.app, upload_request("file", "face.jpg", &small_jpeg_bytes())).await;

    let headers = res.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("x-request-id"));
}
