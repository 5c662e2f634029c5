// src/routes/health.rs
//! Health check endpoint.
//!
//! Reports that the HTTP surface is up together with the current broker
//! connection status. Reading the status is a watch-channel borrow, so the
//! endpoint stays cheap enough for container probes.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::session::{ConnectionStatus, SessionHandle};
use crate::Config;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    mqtt: ConnectionStatus,
}

/// Handle `GET /health`.
async fn health(State((session, _)): State<(SessionHandle, Config)>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        mqtt: session.status(),
    })
}

pub fn router() -> Router<(SessionHandle, Config)> {
    Router::new().route("/health", get(health))
}
