use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;

use crate::startup::AppState;

/// Liveness check. Reports the generation setup without calling upstreams.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let generator = &state.generator;
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": &*state.service_name,
            "version": env!("CARGO_PKG_VERSION"),
            "model": generator.model(),
            "credentials": generator.pool_size(),
            "key_strategy": generator.strategy().as_str(),
        })),
    )
}

/// Readiness check: ready once the identity verifier has signing keys.
pub async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state
        .verifier
        .health_check()
        .await
        .map(|_| StatusCode::OK)
        .map_err(|e| AppError::ServiceUnavailable(e.to_string()))
}
