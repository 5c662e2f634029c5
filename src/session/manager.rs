//! Device telemetry session manager.
//!
//! Owns the connection lifecycle, classifies payloads arriving on the topic,
//! accumulates the sample series, and publishes poll-rate commands. The
//! manager is not thread-safe by itself; [`SessionService`](super::SessionService)
//! confines it to a single task so every mutation happens in one place and in
//! arrival order.
//!
//! State lives inside a `watch` channel. Observers are woken after each
//! mutation that actually changed something; discarded payloads never wake
//! them.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::state::{BrokerEndpoint, ConnectionStatus, SessionState};
use crate::models::{self, WireMessage};
use crate::transport::{Connector, QoS, Transport, TransportEvent, TransportEvents};

// ---

struct ActiveSession {
    // ---
    transport: Box<dyn Transport>,
    events: TransportEvents,
}

pub struct SessionManager {
    // ---
    connector: Arc<dyn Connector>,
    state: watch::Sender<SessionState>,
    active: Option<ActiveSession>,
}

impl SessionManager {
    // ---
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        // ---
        let (state, _) = watch::channel(SessionState::default());
        Self {
            connector,
            state,
            active: None,
        }
    }

    /// Current state. Hold the guard briefly; it blocks the writer.
    pub fn state(&self) -> watch::Ref<'_, SessionState> {
        self.state.borrow()
    }

    /// New observer of state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Whether the transport currently reports a live broker connection.
    pub fn is_connected(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.transport.is_connected())
    }

    /// Open a session to `endpoint` and subscribe to its topic.
    ///
    /// An already active session is torn down first. Connection failures
    /// after this returns arrive later as [`TransportEvent::ConnectionLost`].
    pub fn connect(&mut self, endpoint: BrokerEndpoint) -> Result<()> {
        // ---
        if self.active.is_some() {
            info!("Replacing active session");
            self.disconnect();
        }

        let opened = self.connector.open(&endpoint).and_then(|(transport, events)| {
            transport.subscribe(endpoint.topic(), QoS::ExactlyOnce)?;
            Ok(ActiveSession { transport, events })
        });

        // Address, port and topic are kept even when opening fails
        let failure = opened.as_ref().err().map(|e| format!("{:#}", e));
        self.state.send_modify(|s| {
            s.broker_address = endpoint.address().to_string();
            s.broker_port = endpoint.port();
            s.topic = endpoint.topic().to_string();
            s.status = if failure.is_none() {
                ConnectionStatus::Connecting
            } else {
                ConnectionStatus::Disconnected
            };
            s.poll_rate_secs = 0;
            s.samples.clear();
            s.connected_since = None;
            s.last_error = failure;
        });

        match opened {
            Ok(active) => {
                info!(
                    "Connecting to {}:{}, topic '{}'",
                    endpoint.address(),
                    endpoint.port(),
                    endpoint.topic()
                );
                self.active = Some(active);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to open session: {:#}", e);
                Err(e)
            }
        }
    }

    /// Tear down the session and forget the device cadence.
    ///
    /// Once this returns no further transport event reaches the manager.
    /// Calling it without an active session only resets state.
    pub fn disconnect(&mut self) {
        // ---
        if let Some(active) = self.active.take() {
            let topic = self.state.borrow().topic.clone();
            release(active, &topic);
            info!("Disconnected from broker");
        }

        self.state.send_if_modified(|s| {
            let before = (s.status, s.poll_rate_secs, s.samples.len(), s.connected_since);
            s.status = ConnectionStatus::Disconnected;
            s.poll_rate_secs = 0;
            s.samples.clear();
            s.connected_since = None;
            before != (s.status, s.poll_rate_secs, s.samples.len(), s.connected_since)
        });
    }

    /// Ask the device to report its poll rate.
    pub fn request_poll_rate(&self) {
        // ---
        debug!("Asking for poll rate");
        self.send_command(models::GET_POLL_RATE);
    }

    /// Ask the device to poll every `seconds`. Local state is untouched until
    /// the device confirms with a poll-rate report.
    pub fn set_poll_rate(&self, seconds: u32) {
        // ---
        if seconds == 0 {
            warn!("Ignoring poll rate of 0 seconds");
            return;
        }
        self.send_command(&models::set_poll_rate_command(seconds));
    }

    /// Next event from the active session. Pending forever while there is
    /// none, so it can sit in a `select!` next to other sources.
    pub async fn next_event(&mut self) -> TransportEvent {
        // ---
        match self.active.as_mut() {
            Some(active) => match active.events.recv().await {
                Some(event) => event,
                None => TransportEvent::ConnectionLost("transport event stream closed".to_string()),
            },
            None => std::future::pending().await,
        }
    }

    /// Apply one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) {
        // ---
        match event {
            TransportEvent::Connected => {
                info!("Broker acknowledged connection");
                self.request_poll_rate();
                self.state.send_modify(|s| {
                    s.status = ConnectionStatus::Connected;
                    s.connected_since = Some(Utc::now());
                    s.last_error = None;
                });
            }
            TransportEvent::Message(payload) => self.handle_message(&payload),
            TransportEvent::ConnectionLost(reason) => {
                if self.active.take().is_none() {
                    return;
                }
                warn!("Connection lost: {}", reason);
                self.state.send_modify(|s| {
                    s.status = ConnectionStatus::Disconnected;
                    s.connected_since = None;
                    s.last_error = Some(reason);
                });
            }
        }
    }

    /// Classify a topic payload and apply its effect. Anything that is not
    /// one of the known shapes is dropped; the topic also carries our own
    /// commands.
    fn handle_message(&mut self, payload: &[u8]) {
        // ---
        let Some(message) = WireMessage::decode(payload) else {
            debug!(
                "Discarding unrecognized payload: {}",
                String::from_utf8_lossy(payload)
            );
            return;
        };

        self.state.send_if_modified(|s| match message {
            WireMessage::Sample(sample) => {
                if s.poll_rate_secs == 0 {
                    debug!("Poll rate unknown, dropping sample at {}", sample.time);
                    return false;
                }
                s.samples.push(sample);
                true
            }
            WireMessage::Reset(_) => {
                debug!("Device reset, clearing {} samples", s.samples.len());
                s.samples.clear();
                true
            }
            WireMessage::PollRate(report) => {
                s.poll_rate_secs = report.poll_rate_secs();
                s.samples.clear();
                info!("Device poll rate is {}s", s.poll_rate_secs);
                true
            }
        });
    }

    fn send_command(&self, command: &str) {
        // ---
        let Some(active) = self.active.as_ref() else {
            debug!("No active session, dropping command '{}'", command);
            return;
        };
        let topic = self.state.borrow().topic.clone();
        if let Err(e) = active.transport.publish(&topic, command, QoS::AtLeastOnce) {
            warn!("{:#}", e);
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            let topic = self.state.borrow().topic.clone();
            release(active, &topic);
        }
    }
}

/// Stop listening first, then unsubscribe and close.
fn release(active: ActiveSession, topic: &str) {
    // ---
    let ActiveSession { transport, events } = active;
    drop(events);

    if let Err(e) = transport.unsubscribe(topic) {
        debug!("{:#}", e);
    }
    if let Err(e) = transport.close() {
        debug!("{:#}", e);
    }
}
