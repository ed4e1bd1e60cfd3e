use super::helpers::{expect_status, read_json, send, spawn_app};
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;

async fn get(path: &str) -> Value {
    let test = spawn_app();
    let req = Request::builder()
        .uri(path)
        .body(Body::empty())
        .expect("failed to build request");
    let res = expect_status(send(&test.app, req).await, StatusCode::OK).await;
    read_json(res).await
}

#[tokio::test]
async fn health_reports_model_loaded() {
    let body = get("/health").await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn root_is_an_alias_for_health() {
    assert_eq!(get("/").await, get("/health").await);
}
