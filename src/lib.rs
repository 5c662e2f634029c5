//! Device telemetry session service.
//!
//! Connects to an MQTT broker, follows the telemetry a remote device
//! publishes on one topic, keeps the samples taken at a confirmed poll rate,
//! negotiates that poll rate with the device, and exports the series as CSV.
//!
//! Module boundaries follow the Explicit Module Boundary Pattern (EMBP):
//! - `models`    – wire shapes and command tokens
//! - `transport` – MQTT port and its `rumqttc` adapter
//! - `session`   – session manager and the task that owns it
//! - `export`    – CSV rendering and persistence
//! - `config`    – environment configuration
//! - `routes`    – HTTP control surface

pub mod config;
pub mod export;
pub mod models;
pub mod routes;
pub mod session;
pub mod transport;

pub use config::Config;
pub use models::{PollRateReport, ResetSignal, TelemetrySample, WireMessage};
pub use session::{
    BrokerEndpoint, ConnectionStatus, EndpointError, SessionHandle, SessionManager,
    SessionService, SessionState,
};
pub use transport::{Connector, MqttConnector, Transport, TransportEvent, TransportEvents};
