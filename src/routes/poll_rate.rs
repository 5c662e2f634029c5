//! Poll-rate negotiation with the device.
//!
//! Both endpoints only publish a command. The confirmed rate shows up in
//! `GET /session` once the device answers with a poll-rate report.

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, response::Response, routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{error_response, unavailable};
use crate::session::SessionHandle;
use crate::Config;

// ---

pub fn router() -> Router<(SessionHandle, Config)> {
    // ---
    Router::new()
        .route("/poll-rate", post(set_poll_rate))
        .route("/poll-rate/refresh", post(refresh_poll_rate))
}

#[derive(Debug, Deserialize)]
pub struct PollRateRequest {
    seconds: u32,
}

/// Handle `POST /poll-rate`.
///
/// Rejected while disconnected or while the device cadence is unknown, like
/// the slider it stands in for.
async fn set_poll_rate(
    State((session, config)): State<(SessionHandle, Config)>,
    Json(request): Json<PollRateRequest>,
) -> Response {
    // ---
    if request.seconds == 0 || request.seconds > config.poll_rate_max_secs {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!(
                "seconds must be between 1 and {}",
                config.poll_rate_max_secs
            ),
        );
    }

    if !session.is_connected() {
        return error_response(StatusCode::CONFLICT, "not connected to a broker");
    }

    let current = session.with_state(|s| s.poll_rate_secs);
    if current == 0 {
        return error_response(StatusCode::CONFLICT, "device poll rate is not known yet");
    }

    info!("Poll rate change requested: {}s -> {}s", current, request.seconds);
    match session.set_poll_rate(request.seconds) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "requested_secs": request.seconds, "current_secs": current })),
        )
            .into_response(),
        Err(e) => unavailable(e),
    }
}

/// Handle `POST /poll-rate/refresh`.
async fn refresh_poll_rate(State((session, _)): State<(SessionHandle, Config)>) -> Response {
    // ---
    if !session.is_connected() {
        return error_response(StatusCode::CONFLICT, "not connected to a broker");
    }

    match session.request_poll_rate() {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => unavailable(e),
    }
}
