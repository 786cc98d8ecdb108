//! Socket event monitoring.
//!
//! Provides event streams for tracking socket lifecycle events like
//! dial retries, listening, accepted peers and handshake failures.

use crate::endpoint::Endpoint;
use std::fmt;
use std::time::Duration;

/// Socket lifecycle events.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// Socket successfully connected to a peer (handshake complete).
    Connected(Endpoint),

    /// A dial attempt failed and will be retried after `delay`.
    ConnectRetried {
        endpoint: Endpoint,
        attempt: u32,
        delay: Duration,
    },

    /// Connect gave up (attempt budget or deadline reached).
    ConnectFailed { endpoint: Endpoint, reason: String },

    /// Socket is listening; the endpoint carries the resolved local address.
    Listening(Endpoint),

    /// Bind operation failed.
    BindFailed { endpoint: Endpoint, reason: String },

    /// Socket accepted a new incoming connection.
    Accepted(Endpoint),

    /// The transport came up but the handshake failed.
    HandshakeFailed { endpoint: Endpoint, reason: String },

    /// Socket closed all its connections.
    Closed,
}

impl fmt::Display for SocketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected(ep) => write!(f, "Connected to {ep}"),
            Self::ConnectRetried {
                endpoint,
                attempt,
                delay,
            } => write!(f, "Connect to {endpoint} failed (attempt {attempt}), retrying in {delay:?}"),
            Self::ConnectFailed { endpoint, reason } => {
                write!(f, "Connect failed for {endpoint}: {reason}")
            }
            Self::Listening(ep) => write!(f, "Listening on {ep}"),
            Self::BindFailed { endpoint, reason } => {
                write!(f, "Bind failed for {endpoint}: {reason}")
            }
            Self::Accepted(ep) => write!(f, "Accepted connection on {ep}"),
            Self::HandshakeFailed { endpoint, reason } => {
                write!(f, "Handshake failed for {endpoint}: {reason}")
            }
            Self::Closed => f.write_str("Closed"),
        }
    }
}

/// Handle for receiving socket events.
pub type SocketMonitor = flume::Receiver<SocketEvent>;

/// Sender half used by sockets to emit events.
pub type SocketEventSender = flume::Sender<SocketEvent>;

/// Creates a new monitoring channel pair.
#[must_use]
pub fn create_monitor() -> (SocketEventSender, SocketMonitor) {
    flume::unbounded()
}
