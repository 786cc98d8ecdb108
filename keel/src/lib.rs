//! # Keel
//!
//! ZeroMQ-style CLIENT/SERVER sockets over ZMTP 3.1, built on `io_uring`
//! (via `compio`).
//!
//! ## Architecture
//!
//! - **`keel-core`**: endpoints, transports, options, retry policy, errors
//! - **`keel-zmtp`**: the ZMTP engine (framing, greeting, NULL/PLAIN handshake)
//! - **`keel`**: the [`Socket`] API (this crate)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keel::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = keel::new_server(SecurityMechanism::Null);
//! let events = server.monitor();
//! let server = std::rc::Rc::new(server);
//!
//! let bind = compio::runtime::spawn({
//!     let server = server.clone();
//!     async move { server.bind("tcp://127.0.0.1:0").await }
//! });
//!
//! // The resolved port is announced before the accept completes
//! let SocketEvent::Listening(endpoint) = events.recv_async().await? else {
//!     unreachable!()
//! };
//!
//! let client = keel::new_client(SecurityMechanism::Null);
//! client.connect(&endpoint.to_string()).await?;
//! bind.await?;
//!
//! client.send("ping").await?;
//! assert_eq!(server.recv().await?, "ping");
//! # Ok(())
//! # }
//! ```
//!
//! ## Semantics
//!
//! - `connect` is CLIENT-only and `bind` is SERVER-only; the wrong call fails
//!   with [`KeelError::InvalidSocketAction`] before any I/O
//! - `bind` accepts exactly one peer per call
//! - `send` always targets the first connection
//! - `recv` merges every connection into one stream

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod dev_tracing;
mod socket;

pub use bytes::Bytes;
pub use keel_core::endpoint::{Endpoint, EndpointError, Scheme};
pub use keel_core::error::{KeelError, Result};
pub use keel_core::metadata::Metadata;
pub use keel_core::monitor::{SocketEvent, SocketMonitor};
pub use keel_core::options::SocketOptions;
pub use keel_core::socket_type::SocketType;
pub use keel_core::transport::{Transport, TransportAddr};
pub use keel_zmtp::{
    Message, MessageKind, PeerInfo, PlainAuthenticator, PlainCredentials, ProtocolEngine,
    SecurityMechanism, ZmtpEngine, ZmtpError,
};
pub use socket::Socket;

/// New CLIENT socket (ZMQ_CLIENT) with default options.
pub fn new_client(mechanism: SecurityMechanism) -> Socket {
    Socket::new_client(mechanism)
}

/// New SERVER socket (ZMQ_SERVER) with default options.
pub fn new_server(mechanism: SecurityMechanism) -> Socket {
    Socket::new_server(mechanism)
}

/// Convenient imports for socket users.
pub mod prelude {
    pub use crate::{
        Bytes, Endpoint, KeelError, Message, MessageKind, SecurityMechanism, Socket, SocketEvent,
        SocketOptions, SocketType, TransportAddr,
    };
}
