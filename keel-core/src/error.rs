/// Keel Error Types
///
/// Every socket operation returns [`KeelError`]; engine and transport failures
/// are carried through unchanged.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::endpoint::{Endpoint, EndpointError};
use crate::socket_type::SocketType;
use crate::transport::TransportAddr;

/// Main error type for Keel socket operations
#[derive(Error, Debug)]
pub enum KeelError {
    /// Connect on a SERVER socket or Bind on a CLIENT socket
    #[error("action not valid on this socket: {action} on {socket_type}")]
    InvalidSocketAction {
        action: &'static str,
        socket_type: SocketType,
    },

    /// IO error during socket operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Endpoint string could not be parsed
    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] EndpointError),

    /// Protocol error during ZMTP handshake or framing
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Security mechanism rejected the peer (or the peer rejected us)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Handshake timeout
    #[error("Handshake timeout after {0:?}")]
    HandshakeTimeout(Duration),

    /// Handshake failed after Bind accepted a peer. The listener address is kept
    /// so callers can still report where the socket was bound.
    #[error("Handshake failed on {local_addr}: {source}")]
    BindHandshake {
        local_addr: TransportAddr,
        #[source]
        source: Box<KeelError>,
    },

    /// Dial attempts exhausted
    #[error("Gave up connecting to {endpoint} after {attempts} attempts: {source}")]
    ConnectRetriesExhausted {
        endpoint: Endpoint,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// Connect did not complete within `connect_timeout`
    #[error("Connect to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: Endpoint, timeout: Duration },

    /// Send/recv timeout elapsed
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Send called before any connection was established
    #[error("Socket has no connection")]
    NotConnected,

    /// Socket closed
    #[error("Socket closed")]
    SocketClosed,
}

/// Result type alias for Keel operations
pub type Result<T> = std::result::Result<T, KeelError>;

impl KeelError {
    /// Create a protocol error with a message
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Role-mismatch error for `action` on a socket of `socket_type`.
    pub const fn invalid_action(action: &'static str, socket_type: SocketType) -> Self {
        Self::InvalidSocketAction {
            action,
            socket_type,
        }
    }

    /// Local address attached to a failed Bind handshake, if any.
    #[must_use]
    pub const fn local_addr(&self) -> Option<&TransportAddr> {
        match self {
            Self::BindHandshake { local_addr, .. } => Some(local_addr),
            _ => None,
        }
    }

    /// Check if this is the role-mismatch sentinel
    #[must_use]
    pub const fn is_invalid_action(&self) -> bool {
        matches!(self, Self::InvalidSocketAction { .. })
    }

    /// Check if this is a connection error
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::SocketClosed
                | Self::NotConnected
                | Self::HandshakeTimeout(_)
                | Self::ConnectRetriesExhausted { .. }
                | Self::ConnectTimeout { .. }
        )
    }
}
