// src/routes/health.rs
//! Health check endpoint.
//!
//! `/health` lets container orchestrators and CI confirm the service is up.
//! It also reports how much the store currently holds, which helps tell
//! "listener is silent" apart from "exporter is down".

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;

/// JSON response body for the `/health` endpoint.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    known_sensors: usize,
    fresh_sensors: usize,
    events: usize,
}

/// Handle `GET /health`.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    // ---
    let summary = state.store.summary();
    Json(HealthResponse {
        status: "ok",
        known_sensors: summary.known_sensors,
        fresh_sensors: summary.fresh_sensors,
        events: summary.events,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
