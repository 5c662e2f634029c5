//! Session state and broker endpoint validation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::TelemetrySample;

// ---

/// Why a broker address/port/topic triple was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("broker address must not be empty")]
    EmptyAddress,

    #[error("invalid broker address '{0}': expected a bare host name or IP")]
    InvalidAddress(String),

    #[error("invalid broker port '{0}': expected 1-65535")]
    InvalidPort(String),

    #[error("topic must not be empty")]
    EmptyTopic,

    #[error("invalid topic '{0}': wildcards are not allowed")]
    WildcardTopic(String),
}

/// A validated broker target. Constructing one is the only way to reach
/// [`SessionManager::connect`](super::SessionManager::connect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    // ---
    address: String,
    port: u16,
    topic: String,
}

impl BrokerEndpoint {
    // ---
    /// Validate user input. `port` is taken as text since it comes straight
    /// from a form field or an environment variable.
    pub fn new(address: &str, port: &str, topic: &str) -> Result<Self, EndpointError> {
        // ---
        let address = address.trim();
        if address.is_empty() {
            return Err(EndpointError::EmptyAddress);
        }
        if address.contains("://")
            || address
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '@'))
        {
            return Err(EndpointError::InvalidAddress(address.to_string()));
        }

        let port_text = port.trim();
        let port = match port_text.parse::<u16>() {
            Ok(p) if p > 0 => p,
            _ => return Err(EndpointError::InvalidPort(port_text.to_string())),
        };

        let topic = topic.trim();
        if topic.is_empty() {
            return Err(EndpointError::EmptyTopic);
        }
        // Commands are published on the same topic, which must be a plain name
        if topic.contains(['+', '#']) {
            return Err(EndpointError::WildcardTopic(topic.to_string()));
        }

        Ok(Self {
            address: address.to_string(),
            port,
            topic: topic.to_string(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Everything observers can see about the current session.
///
/// `samples` is only ever non-empty while `poll_rate_secs != 0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    // ---
    pub broker_address: String,
    pub broker_port: u16,
    pub topic: String,
    pub status: ConnectionStatus,

    /// Device cadence in seconds as last reported, 0 while unknown.
    pub poll_rate_secs: i64,

    pub samples: Vec<TelemetrySample>,

    /// When the broker acknowledged the current connection.
    pub connected_since: Option<DateTime<Utc>>,

    /// Reason of the last transport failure, if any.
    pub last_error: Option<String>,
}

impl SessionState {
    // ---
    /// Last endpoint used, for reconnecting with the same settings.
    pub fn last_endpoint(&self) -> Option<BrokerEndpoint> {
        BrokerEndpoint::new(
            &self.broker_address,
            &self.broker_port.to_string(),
            &self.topic,
        )
        .ok()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_valid_endpoint() {
        // ---
        let ep = BrokerEndpoint::new(" broker.emqx.io ", "1883", "BenRID").unwrap();
        assert_eq!(ep.address(), "broker.emqx.io");
        assert_eq!(ep.port(), 1883);
        assert_eq!(ep.topic(), "BenRID");

        let ep = BrokerEndpoint::new("10.0.0.7", " 8883 ", "lab/sensors").unwrap();
        assert_eq!(ep.port(), 8883);
        assert_eq!(ep.topic(), "lab/sensors");
    }

    #[test]
    fn test_rejected_endpoints() {
        // ---
        assert_eq!(
            BrokerEndpoint::new("", "1883", "t"),
            Err(EndpointError::EmptyAddress)
        );
        assert_eq!(
            BrokerEndpoint::new("   ", "1883", "t"),
            Err(EndpointError::EmptyAddress)
        );
        assert_eq!(
            BrokerEndpoint::new("host", "1883", " "),
            Err(EndpointError::EmptyTopic)
        );
        assert_eq!(
            BrokerEndpoint::new("host", "abc", "t"),
            Err(EndpointError::InvalidPort("abc".to_string()))
        );
        assert_eq!(
            BrokerEndpoint::new("host", "0", "t"),
            Err(EndpointError::InvalidPort("0".to_string()))
        );
        assert_eq!(
            BrokerEndpoint::new("host", "70000", "t"),
            Err(EndpointError::InvalidPort("70000".to_string()))
        );
        assert!(matches!(
            BrokerEndpoint::new("mqtt://host", "1883", "t"),
            Err(EndpointError::InvalidAddress(_))
        ));
        assert!(matches!(
            BrokerEndpoint::new("my host", "1883", "t"),
            Err(EndpointError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_wildcard_topics_rejected() {
        // ---
        for topic in ["#", "lab/#", "+/sensors", "lab/+/temp"] {
            assert_eq!(
                BrokerEndpoint::new("host", "1883", topic),
                Err(EndpointError::WildcardTopic(topic.to_string())),
                "topic: {}",
                topic
            );
        }
    }

    #[test]
    fn test_last_endpoint() {
        // ---
        assert_eq!(SessionState::default().last_endpoint(), None);

        let state = SessionState {
            broker_address: "broker.emqx.io".to_string(),
            broker_port: 1883,
            topic: "BenRID".to_string(),
            ..Default::default()
        };
        let ep = state.last_endpoint().unwrap();
        assert_eq!(ep.address(), "broker.emqx.io");
        assert_eq!(ep.port(), 1883);
    }
}
