//! Keel Core
//!
//! Protocol-agnostic building blocks shared by the engine and the socket API:
//! - Endpoint parsing (`endpoint`)
//! - TCP / IPC transports and the single-accept listener (`transport`)
//! - Socket options and dial retry policy (`options`, `reconnect`)
//! - Socket types (`socket_type`)
//! - Handshake metadata (`metadata`)
//! - Lifecycle events (`monitor`)
//! - Optional deadlines (`timeout`)
//! - Error types (`error`)

#![deny(unsafe_code)]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
pub mod endpoint;
pub mod error;
pub mod metadata;
pub mod monitor;
pub mod options;
pub mod reconnect;
pub mod socket_type;
pub mod timeout;
pub mod transport;

pub mod prelude {
    pub use crate::endpoint::{Endpoint, Scheme};
    pub use crate::error::{KeelError, Result};
    pub use crate::metadata::Metadata;
    pub use crate::monitor::{SocketEvent, SocketMonitor};
    pub use crate::options::SocketOptions;
    pub use crate::reconnect::RetryState;
    pub use crate::socket_type::SocketType;
    pub use crate::transport::{
        Listener, Transport, TransportAddr, TransportReader, TransportWriter,
    };
}
