use crate::presentation::http::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
    version: &'static str,
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let model_loaded = state.classify.model_loaded();
    if !model_loaded {
        tracing::error!("Health check failed: classifier model not loaded");
    }

    let (code, status) = if model_loaded {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let response = HealthResponse {
        status,
        model_loaded,
        version: env!("CARGO_PKG_VERSION"),
    };

    (code, Json(response))
}
