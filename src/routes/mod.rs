//! HTTP control surface gateway (EMBP).
//!
//! Each sibling module exports a subrouter over the shared
//! `(SessionHandle, Config)` state; this gateway merges them so `main.rs`
//! and the integration tests only ever see [`router`].

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json, Router};
use serde_json::json;

use crate::session::SessionHandle;
use crate::Config;

mod health;
mod poll_rate;
mod readings;
mod session;

// ---

pub fn router(session: SessionHandle, config: Config) -> Router {
    // ---
    Router::new()
        .merge(session::router())
        .merge(poll_rate::router())
        .merge(readings::router())
        .merge(health::router())
        .with_state((session, config))
}

/// JSON error body shared by all handlers.
fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    // ---
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// A command could not reach the session task.
fn unavailable(err: anyhow::Error) -> Response {
    // ---
    tracing::error!("{:#}", err);
    error_response(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
}
