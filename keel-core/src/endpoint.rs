//! Endpoint abstraction for transport-agnostic socket addressing.
//!
//! An endpoint is `<scheme>://<address>`. The scheme picks the transport; the
//! address is handed to that transport untouched (a `host:port` for TCP, a
//! filesystem path for IPC).

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

const SEPARATOR: &str = "://";

/// Transport selected by an endpoint scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `tcp://host:port`
    Tcp,
    /// `ipc:///path/to/socket` (Unix domain socket)
    Ipc,
}

impl Scheme {
    /// Get the scheme as it appears in an endpoint string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Ipc => "ipc",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    scheme: Scheme,
    address: String,
}

impl Endpoint {
    /// Parse an endpoint from a string.
    ///
    /// Supported formats:
    /// - `tcp://127.0.0.1:5555`
    /// - `tcp://localhost:5555`
    /// - `ipc:///tmp/socket.sock` (Unix only)
    ///
    /// # Examples
    ///
    /// ```
    /// use keel_core::endpoint::{Endpoint, Scheme};
    ///
    /// let endpoint = Endpoint::parse("tcp://127.0.0.1:5555").unwrap();
    /// assert_eq!(endpoint.scheme(), Scheme::Tcp);
    /// assert_eq!(endpoint.address(), "127.0.0.1:5555");
    /// ```
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        s.parse()
    }

    /// Build a TCP endpoint from a resolved socket address.
    pub fn tcp(addr: SocketAddr) -> Self {
        Self {
            scheme: Scheme::Tcp,
            address: addr.to_string(),
        }
    }

    /// Build an IPC endpoint from a socket path.
    pub fn ipc(path: &Path) -> Self {
        Self {
            scheme: Scheme::Ipc,
            address: path.display().to_string(),
        }
    }

    /// Transport scheme.
    #[inline]
    pub const fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Opaque transport address (everything after `://`).
    #[inline]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns true if this is a TCP endpoint.
    pub fn is_tcp(&self) -> bool {
        self.scheme == Scheme::Tcp
    }

    /// Returns true if this is an IPC endpoint.
    pub fn is_ipc(&self) -> bool {
        self.scheme == Scheme::Ipc
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, address) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| EndpointError::MissingSeparator(s.to_string()))?;

        if address.contains(SEPARATOR) {
            return Err(EndpointError::MultipleSeparators(s.to_string()));
        }
        if address.is_empty() {
            return Err(EndpointError::EmptyAddress(s.to_string()));
        }

        let scheme = match scheme {
            "tcp" => Scheme::Tcp,
            "ipc" if cfg!(unix) => Scheme::Ipc,
            "ipc" => return Err(EndpointError::IpcNotSupported),
            other => return Err(EndpointError::InvalidScheme(other.to_string())),
        };

        Ok(Self {
            scheme,
            address: address.to_string(),
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.scheme, self.address)
    }
}

/// Errors that can occur when parsing endpoints.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("Missing '://' in endpoint: {0}")]
    MissingSeparator(String),

    #[error("More than one '://' in endpoint: {0}")]
    MultipleSeparators(String),

    #[error("Empty address in endpoint: {0}")]
    EmptyAddress(String),

    #[error("Invalid scheme in endpoint: {0} (expected tcp or ipc)")]
    InvalidScheme(String),

    #[error("IPC transport not supported on this platform")]
    IpcNotSupported,
}
