//! Single-task home of the [`SessionManager`].
//!
//! Commands from any number of [`SessionHandle`]s and events from the active
//! transport are multiplexed onto one task, which makes it the only writer of
//! the session state and keeps message processing in arrival order.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error};

use super::manager::SessionManager;
use super::state::{BrokerEndpoint, ConnectionStatus, SessionState};
use crate::transport::Connector;

// ---

#[derive(Debug)]
enum Command {
    Connect(BrokerEndpoint),
    Disconnect,
    RequestPollRate,
    SetPollRate(u32),
}

pub struct SessionService;

impl SessionService {
    // ---
    /// Start the session task on the current runtime.
    ///
    /// The task stops, tearing down any open session, once every handle has
    /// been dropped.
    pub fn spawn(connector: Arc<dyn Connector>) -> SessionHandle {
        // ---
        let manager = SessionManager::new(connector);
        let state = manager.subscribe();
        let (commands, rx) = mpsc::unbounded_channel();

        tokio::spawn(run(manager, rx));

        SessionHandle { commands, state }
    }
}

async fn run(mut manager: SessionManager, mut commands: mpsc::UnboundedReceiver<Command>) {
    // ---
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => execute(&mut manager, command),
                None => break,
            },
            event = manager.next_event() => manager.handle_event(event),
        }
    }

    manager.disconnect();
    debug!("Session service stopped");
}

fn execute(manager: &mut SessionManager, command: Command) {
    // ---
    debug!("Session command: {:?}", command);
    match command {
        Command::Connect(endpoint) => {
            if let Err(e) = manager.connect(endpoint) {
                error!("Connect failed: {:#}", e);
            }
        }
        Command::Disconnect => manager.disconnect(),
        Command::RequestPollRate => manager.request_poll_rate(),
        Command::SetPollRate(seconds) => manager.set_poll_rate(seconds),
    }
}

/// Cheap, cloneable front end to the session task.
///
/// Commands are fire-and-forget: they fail only when the task is gone.
/// Their effect becomes visible through [`SessionHandle::state`] or a
/// [`SessionHandle::subscribe`] receiver.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    // ---
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    // ---
    pub fn connect(&self, endpoint: BrokerEndpoint) -> Result<()> {
        self.send(Command::Connect(endpoint))
    }

    pub fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect)
    }

    pub fn request_poll_rate(&self) -> Result<()> {
        self.send(Command::RequestPollRate)
    }

    pub fn set_poll_rate(&self, seconds: u32) -> Result<()> {
        self.send(Command::SetPollRate(seconds))
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Run `f` against the current state without cloning it. Keep `f` short;
    /// the session task cannot publish while it runs.
    pub fn with_state<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.state.borrow())
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().status
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Whether the broker has acknowledged the current session. Mirrors the
    /// transport flag: the transport reports every change of it as an event.
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("session service is not running"))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::transport::{QoS, Transport, TransportEvent, TransportEvents};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Connector whose sessions publish into a shared log and whose event
    /// senders the test drives by hand.
    #[derive(Default, Clone)]
    struct ScriptedConnector {
        published: Arc<Mutex<Vec<String>>>,
        senders: Arc<Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>>,
    }

    struct ScriptedTransport {
        published: Arc<Mutex<Vec<String>>>,
    }

    impl Transport for ScriptedTransport {
        fn subscribe(&self, _topic: &str, _qos: QoS) -> Result<()> {
            Ok(())
        }
        fn unsubscribe(&self, _topic: &str) -> Result<()> {
            Ok(())
        }
        fn publish(&self, _topic: &str, payload: &str, _qos: QoS) -> Result<()> {
            self.published.lock().unwrap().push(payload.to_string());
            Ok(())
        }
        fn close(&self) -> Result<()> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
    }

    impl Connector for ScriptedConnector {
        fn open(&self, _endpoint: &BrokerEndpoint) -> Result<(Box<dyn Transport>, TransportEvents)> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().unwrap().push(tx);
            let transport: Box<dyn Transport> = Box::new(ScriptedTransport {
                published: self.published.clone(),
            });
            Ok((transport, rx))
        }
    }

    impl ScriptedConnector {
        fn sender(&self) -> mpsc::UnboundedSender<TransportEvent> {
            self.senders
                .lock()
                .unwrap()
                .last()
                .cloned()
                .expect("no session opened")
        }
    }

    async fn wait_until(handle: &SessionHandle, pred: impl FnMut(&SessionState) -> bool) -> SessionState {
        let mut rx = handle.subscribe();
        let state = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
            .await
            .expect("timed out waiting for session state")
            .expect("session service stopped")
            .clone();
        state
    }

    fn endpoint() -> BrokerEndpoint {
        BrokerEndpoint::new("localhost", "1883", "BenRID").unwrap()
    }

    #[tokio::test]
    async fn test_service_round_trip() {
        // ---
        let connector = ScriptedConnector::default();
        let handle = SessionService::spawn(Arc::new(connector.clone()));

        handle.connect(endpoint()).unwrap();
        wait_until(&handle, |s| s.status == ConnectionStatus::Connecting).await;

        let events = connector.sender();
        events.send(TransportEvent::Connected).unwrap();
        wait_until(&handle, |s| s.status == ConnectionStatus::Connected).await;
        assert!(handle.is_connected());
        assert_eq!(*connector.published.lock().unwrap(), vec!["getPollRate:"]);

        events
            .send(TransportEvent::Message(br#"{"pollRate":3000}"#.to_vec()))
            .unwrap();
        events
            .send(TransportEvent::Message(
                br#"{"humidity":40.5,"temperature":19.0,"time":3000}"#.to_vec(),
            ))
            .unwrap();
        let state = wait_until(&handle, |s| s.samples.len() == 1).await;
        assert_eq!(state.poll_rate_secs, 3);

        handle.set_poll_rate(4).unwrap();
        handle.request_poll_rate().unwrap();
        handle.disconnect().unwrap();
        let state = wait_until(&handle, |s| s.status == ConnectionStatus::Disconnected).await;
        assert!(state.samples.is_empty());
        assert_eq!(state.poll_rate_secs, 0);
        assert_eq!(
            *connector.published.lock().unwrap(),
            vec!["getPollRate:", "setPollRate:4000", "getPollRate:"]
        );

        // Late delivery after disconnect goes nowhere
        assert!(events
            .send(TransportEvent::Message(br#"{"pollRate":1000}"#.to_vec()))
            .is_err());
    }

    #[tokio::test]
    async fn test_connection_lost_reflected_in_status() {
        // ---
        let connector = ScriptedConnector::default();
        let handle = SessionService::spawn(Arc::new(connector.clone()));

        handle.connect(endpoint()).unwrap();
        wait_until(&handle, |s| s.status == ConnectionStatus::Connecting).await;
        connector.sender().send(TransportEvent::Connected).unwrap();
        wait_until(&handle, |s| s.status == ConnectionStatus::Connected).await;

        connector
            .sender()
            .send(TransportEvent::ConnectionLost("connection reset".into()))
            .unwrap();
        let state = wait_until(&handle, |s| s.status == ConnectionStatus::Disconnected).await;
        assert_eq!(state.last_error.as_deref(), Some("connection reset"));
        assert!(!handle.is_connected());
    }
}
