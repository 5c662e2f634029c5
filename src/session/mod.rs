//! Session gateway (EMBP): siblings stay private, the public surface is
//! re-exported here.

mod manager;
mod service;
mod state;

pub use manager::SessionManager;
pub use service::{SessionHandle, SessionService};
pub use state::{BrokerEndpoint, ConnectionStatus, EndpointError, SessionState};
