//! Transport port for the MQTT collaborator.
//!
//! The session core only talks to [`Transport`] and [`Connector`]; the
//! production adapter ([`MqttConnector`]) wraps a `rumqttc` client and pumps
//! its event loop on a dedicated task, forwarding what the session cares about
//! as [`TransportEvent`]s on an unbounded channel.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::session::BrokerEndpoint;

pub use rumqttc::QoS;

// ---

/// Notifications delivered by a transport session, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker acknowledged the connection.
    Connected,
    /// A payload arrived on the subscribed topic.
    Message(Vec<u8>),
    /// The link failed; the transport will not reconnect on its own.
    ConnectionLost(String),
}

/// Receiving half of a transport session's notification stream.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// One open broker session. All calls are non-blocking; the network effect
/// happens later on the transport's own task.
pub trait Transport: Send {
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<()>;
    fn unsubscribe(&self, topic: &str) -> Result<()>;
    fn publish(&self, topic: &str, payload: &str, qos: QoS) -> Result<()>;
    fn close(&self) -> Result<()>;
    fn is_connected(&self) -> bool;
}

/// Opens transport sessions.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, endpoint: &BrokerEndpoint) -> Result<(Box<dyn Transport>, TransportEvents)>;
}

// ---

/// `rumqttc` backed connector.
#[derive(Debug, Clone)]
pub struct MqttConnector {
    // ---
    client_id: String,
    keep_alive: Duration,
}

impl MqttConnector {
    // ---
    pub fn new(client_id: impl Into<String>, keep_alive: Duration) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive,
        }
    }
}

impl Connector for MqttConnector {
    // ---
    fn open(&self, endpoint: &BrokerEndpoint) -> Result<(Box<dyn Transport>, TransportEvents)> {
        // ---
        let mut options = MqttOptions::new(&self.client_id, endpoint.address(), endpoint.port());
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, 16);
        let connected = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();

        info!(
            "Opening MQTT session to {}:{} as {}",
            endpoint.address(),
            endpoint.port(),
            self.client_id
        );

        let runtime = tokio::runtime::Handle::try_current()
            .context("MQTT transport must be opened from within a tokio runtime")?;
        runtime.spawn(pump_events(
            eventloop,
            endpoint.topic().to_string(),
            connected.clone(),
            tx,
        ));

        let transport: Box<dyn Transport> = Box::new(MqttTransport { client, connected });
        Ok((transport, rx))
    }
}

struct MqttTransport {
    // ---
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl Transport for MqttTransport {
    // ---
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<()> {
        self.client
            .try_subscribe(topic, qos)
            .with_context(|| format!("Failed to queue subscribe for '{}'", topic))
    }

    fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.client
            .try_unsubscribe(topic)
            .with_context(|| format!("Failed to queue unsubscribe for '{}'", topic))
    }

    fn publish(&self, topic: &str, payload: &str, qos: QoS) -> Result<()> {
        self.client
            .try_publish(topic, qos, false, payload.as_bytes().to_vec())
            .with_context(|| format!("Failed to queue publish on '{}'", topic))
    }

    fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.client
            .try_disconnect()
            .context("Failed to queue MQTT disconnect")
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Drive the `rumqttc` event loop until it fails, the session is closed, or
/// nobody listens anymore.
async fn pump_events(
    mut eventloop: EventLoop,
    topic: String,
    connected: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<TransportEvent>,
) {
    // ---
    loop {
        let event = match eventloop.poll().await {
            Ok(event) => event,
            Err(e) => {
                connected.store(false, Ordering::SeqCst);
                // A requested disconnect also ends the loop with an error
                if !tx.is_closed() {
                    warn!("MQTT event loop stopped: {}", e);
                }
                let _ = tx.send(TransportEvent::ConnectionLost(e.to_string()));
                break;
            }
        };

        let forwarded = match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                debug!("ConnAck: {:?}", ack.code);
                connected.store(true, Ordering::SeqCst);
                Some(TransportEvent::Connected)
            }
            Event::Incoming(Packet::Publish(publish)) if publish.topic == topic => {
                Some(TransportEvent::Message(publish.payload.to_vec()))
            }
            Event::Incoming(Packet::Disconnect) => {
                connected.store(false, Ordering::SeqCst);
                let _ = tx.send(TransportEvent::ConnectionLost(
                    "broker sent disconnect".to_string(),
                ));
                break;
            }
            Event::Outgoing(rumqttc::Outgoing::Disconnect) => {
                connected.store(false, Ordering::SeqCst);
                None
            }
            _ => None,
        };

        if let Some(event) = forwarded {
            if tx.send(event).is_err() {
                debug!("Session released, stopping MQTT event loop");
                break;
            }
        }
    }
}
