//! Socket type enumeration.
//!
//! Keel implements the ZMTP 3.1 thread-safe socket pair: CLIENT dials out,
//! SERVER listens and accepts.

use std::fmt;

/// ZeroMQ socket types supported by Keel.
///
/// Corresponds to ZMQ_TYPE socket option (16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
    /// CLIENT socket: may only `connect`
    Client,

    /// SERVER socket: may only `bind`
    Server,
}

impl SocketType {
    /// Get the socket type name as sent in the READY `Socket-Type` property.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "CLIENT",
            Self::Server => "SERVER",
        }
    }

    /// Parse the `Socket-Type` property value.
    pub fn from_wire(value: &[u8]) -> Option<Self> {
        match value {
            b"CLIENT" => Some(Self::Client),
            b"SERVER" => Some(Self::Server),
            _ => None,
        }
    }

    /// Whether this socket plays the listening (server) role.
    #[inline]
    pub const fn as_server(&self) -> bool {
        matches!(self, Self::Server)
    }

    /// Check if this socket type is compatible with the given peer type.
    pub const fn is_compatible(&self, peer: SocketType) -> bool {
        matches!(
            (self, peer),
            (Self::Client, Self::Server) | (Self::Server, Self::Client)
        )
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
