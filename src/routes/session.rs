//! Broker connection controls: the settings form of the control surface.

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, response::Response, routing::get,
    routing::post, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{error_response, unavailable};
use crate::session::{BrokerEndpoint, ConnectionStatus, EndpointError, SessionHandle, SessionState};
use crate::Config;

// ---

pub fn router() -> Router<(SessionHandle, Config)> {
    // ---
    Router::new()
        .route("/session", get(summary))
        .route("/session/connect", post(connect))
        .route("/session/disconnect", post(disconnect))
        .route("/session/toggle", post(toggle))
}

/// Connect request. Missing fields fall back to the last session's values,
/// then to the configured defaults. `port` may be a number or a string.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectRequest {
    address: Option<String>,
    port: Option<Value>,
    topic: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionSummary {
    // ---
    address: String,
    port: u16,
    topic: String,
    status: ConnectionStatus,
    poll_rate_secs: i64,
    sample_count: usize,
    connected_since: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl From<&SessionState> for SessionSummary {
    fn from(state: &SessionState) -> Self {
        Self {
            address: state.broker_address.clone(),
            port: state.broker_port,
            topic: state.topic.clone(),
            status: state.status,
            poll_rate_secs: state.poll_rate_secs,
            sample_count: state.samples.len(),
            connected_since: state.connected_since,
            last_error: state.last_error.clone(),
        }
    }
}

async fn summary(State((session, _)): State<(SessionHandle, Config)>) -> Json<SessionSummary> {
    // ---
    Json(session.with_state(|state| SessionSummary::from(state)))
}

async fn connect(
    State((session, config)): State<(SessionHandle, Config)>,
    Json(request): Json<ConnectRequest>,
) -> Response {
    // ---
    let endpoint = session.with_state(|current| resolve_endpoint(&request, current, &config));
    start_session(&session, endpoint)
}

async fn disconnect(State((session, _)): State<(SessionHandle, Config)>) -> Response {
    // ---
    match session.disconnect() {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => unavailable(e),
    }
}

/// Connect with the remembered settings when idle, disconnect otherwise.
async fn toggle(State((session, config)): State<(SessionHandle, Config)>) -> Response {
    // ---
    if session.status() != ConnectionStatus::Disconnected {
        info!("Toggle: disconnecting");
        return match session.disconnect() {
            Ok(()) => StatusCode::ACCEPTED.into_response(),
            Err(e) => unavailable(e),
        };
    }

    info!("Toggle: connecting");
    let endpoint =
        session.with_state(|current| resolve_endpoint(&ConnectRequest::default(), current, &config));
    start_session(&session, endpoint)
}

fn start_session(session: &SessionHandle, endpoint: Result<BrokerEndpoint, EndpointError>) -> Response {
    // ---
    let endpoint = match endpoint {
        Ok(endpoint) => endpoint,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    info!(
        "Connect requested: {}:{} topic '{}'",
        endpoint.address(),
        endpoint.port(),
        endpoint.topic()
    );
    match session.connect(endpoint) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => unavailable(e),
    }
}

/// Fill in missing fields and validate.
fn resolve_endpoint(
    request: &ConnectRequest,
    current: &SessionState,
    config: &Config,
) -> Result<BrokerEndpoint, EndpointError> {
    // ---
    let address = match &request.address {
        Some(address) => address.clone(),
        None if !current.broker_address.is_empty() => current.broker_address.clone(),
        None => config.broker_host.clone(),
    };

    let port = match &request.port {
        Some(Value::String(port)) => port.clone(),
        Some(port) => port.to_string(),
        None if current.broker_port != 0 => current.broker_port.to_string(),
        None => config.broker_port.to_string(),
    };

    let topic = match &request.topic {
        Some(topic) => topic.clone(),
        None if !current.topic.is_empty() => current.topic.clone(),
        None => config.topic.clone(),
    };

    BrokerEndpoint::new(&address, &port, &topic)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn request(json: &str) -> ConnectRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults_from_config() {
        // ---
        let ep = resolve_endpoint(&request("{}"), &SessionState::default(), &Config::default())
            .unwrap();
        assert_eq!(ep.address(), "broker.emqx.io");
        assert_eq!(ep.port(), 1883);
        assert_eq!(ep.topic(), "BenRID");
    }

    #[test]
    fn test_defaults_from_last_session() {
        // ---
        let current = SessionState {
            broker_address: "10.0.0.2".into(),
            broker_port: 1884,
            topic: "lab".into(),
            ..Default::default()
        };
        let ep = resolve_endpoint(&request(r#"{"topic":"other"}"#), &current, &Config::default())
            .unwrap();
        assert_eq!(ep.address(), "10.0.0.2");
        assert_eq!(ep.port(), 1884);
        assert_eq!(ep.topic(), "other");
    }

    #[test]
    fn test_port_as_number_or_text() {
        // ---
        let state = SessionState::default();
        let config = Config::default();

        let ep = resolve_endpoint(&request(r#"{"port":8883}"#), &state, &config).unwrap();
        assert_eq!(ep.port(), 8883);
        let ep = resolve_endpoint(&request(r#"{"port":"8884"}"#), &state, &config).unwrap();
        assert_eq!(ep.port(), 8884);

        let err = resolve_endpoint(&request(r#"{"port":1.5}"#), &state, &config).unwrap_err();
        assert_eq!(err, EndpointError::InvalidPort("1.5".into()));
    }

    #[test]
    fn test_explicit_empty_fields_rejected() {
        // ---
        let state = SessionState::default();
        let config = Config::default();
        assert_eq!(
            resolve_endpoint(&request(r#"{"address":""}"#), &state, &config),
            Err(EndpointError::EmptyAddress)
        );
        assert_eq!(
            resolve_endpoint(&request(r#"{"topic":""}"#), &state, &config),
            Err(EndpointError::EmptyTopic)
        );
    }
}
