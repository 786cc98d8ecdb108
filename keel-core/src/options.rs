//! Socket configuration options
//!
//! This module provides configuration options for Keel sockets, similar to
//! libzmq's socket options (zmq_setsockopt/zmq_getsockopt). Options are fixed
//! when the socket is built; there is no process-wide default state.

use std::time::Duration;

use crate::metadata::Metadata;

/// Default reconnect interval (ZMQ_RECONNECT_IVL).
pub const DEFAULT_RECONNECT_IVL: Duration = Duration::from_millis(250);

/// Socket configuration options.
///
/// # Examples
///
/// ```
/// use keel_core::options::SocketOptions;
/// use std::time::Duration;
///
/// let opts = SocketOptions::default()
///     .with_reconnect_ivl(Duration::from_millis(50))
///     .with_connect_attempts(20)
///     .with_recv_timeout(Duration::from_secs(5));
/// assert_eq!(opts.connect_attempts, Some(20));
/// ```
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Reconnect interval (ZMQ_RECONNECT_IVL)
    ///
    /// Delay between failed dial attempts in `connect`.
    /// - Default: 250ms
    pub reconnect_ivl: Duration,

    /// Maximum reconnect interval (ZMQ_RECONNECT_IVL_MAX)
    ///
    /// - Default: 0 (fixed interval, `reconnect_ivl` is used for every retry)
    /// - When > 0: the delay doubles after each failure up to this value
    pub reconnect_ivl_max: Duration,

    /// Maximum number of dial attempts per `connect` call.
    ///
    /// - `None`: retry until the dial succeeds (default)
    /// - `Some(n)`: give up after `n` failed attempts
    pub connect_attempts: Option<u32>,

    /// Overall deadline for `connect`, covering every retry and the handshake.
    ///
    /// - `None`: no deadline (default)
    pub connect_timeout: Option<Duration>,

    /// Handshake timeout (ZMQ_HANDSHAKE_IVL)
    ///
    /// Maximum time to complete the ZMTP handshake after the transport is up.
    /// - Default: 30 seconds
    /// - Set to `Duration::ZERO` to disable timeout
    pub handshake_timeout: Duration,

    /// Send timeout (ZMQ_SNDTIMEO)
    ///
    /// - `None`: Block indefinitely (default)
    /// - `Some(duration)`: Wait up to duration before failing
    pub send_timeout: Option<Duration>,

    /// Receive timeout (ZMQ_RCVTIMEO)
    ///
    /// - `None`: Block indefinitely (default)
    /// - `Some(duration)`: Wait up to duration before failing
    pub recv_timeout: Option<Duration>,

    /// Read buffer size (bytes) used by each connection's receive task.
    pub read_buffer_size: usize,

    /// Extra properties advertised during the handshake (READY / INITIATE),
    /// e.g. `Identity`.
    pub metadata: Metadata,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            reconnect_ivl: DEFAULT_RECONNECT_IVL,
            reconnect_ivl_max: Duration::ZERO, // Fixed interval
            connect_attempts: None,            // Unlimited
            connect_timeout: None,
            handshake_timeout: Duration::from_secs(30),
            send_timeout: None,
            recv_timeout: None,
            read_buffer_size: 8192,
            metadata: Metadata::new(),
        }
    }
}

impl SocketOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set reconnect interval.
    #[must_use]
    pub const fn with_reconnect_ivl(mut self, ivl: Duration) -> Self {
        self.reconnect_ivl = ivl;
        self
    }

    /// Set maximum reconnect interval (enables exponential backoff).
    #[must_use]
    pub const fn with_reconnect_ivl_max(mut self, ivl: Duration) -> Self {
        self.reconnect_ivl_max = ivl;
        self
    }

    /// Cap the number of dial attempts per `connect`.
    #[must_use]
    pub const fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = Some(attempts);
        self
    }

    /// Set an overall deadline for `connect`.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set handshake timeout.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set send timeout.
    #[must_use]
    pub const fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Set receive timeout.
    #[must_use]
    pub const fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Advertise an extra handshake property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<bytes::Bytes>) -> Self {
        self.metadata.insert(name, value);
        self
    }

    /// Handshake timeout as an optional deadline (`ZERO` means none).
    #[must_use]
    pub fn handshake_deadline(&self) -> Option<Duration> {
        (!self.handshake_timeout.is_zero()).then_some(self.handshake_timeout)
    }
}
