//! CLIENT/SERVER socket.
//!
//! A [`Socket`] owns an append-only list of connections and one inbound
//! channel shared by every connection's receive task. The socket lock guards
//! only that list; writes happen outside it, so `close` can always run.
//!
//! - `connect` (CLIENT only) dials with retry, then handshakes
//! - `bind` (SERVER only) listens, accepts exactly one peer, then handshakes
//! - `send` always writes to the first connection
//! - `recv` returns whatever any connection delivered next
//!
//! Messages from one connection arrive in order. There is no ordering
//! guarantee across connections.

use async_lock::Mutex;
use bytes::Bytes;
use keel_core::endpoint::Endpoint;
use keel_core::error::{KeelError, Result};
use keel_core::monitor::{create_monitor, SocketEvent, SocketEventSender, SocketMonitor};
use keel_core::options::SocketOptions;
use keel_core::reconnect::RetryState;
use keel_core::socket_type::SocketType;
use keel_core::timeout::with_timeout;
use keel_core::transport::{Listener, Transport, TransportAddr};
use keel_zmtp::{Message, ProtocolEngine, SecurityMechanism, ZmtpEngine};
use std::rc::Rc;
use tracing::{debug, trace, warn};

use crate::connection::Connection;

struct State<E> {
    connections: Vec<Rc<Connection<E>>>,
    /// Cloned into every receive task. `None` once closed.
    inbound_tx: Option<flume::Sender<Message>>,
    closed: bool,
}

/// A CLIENT or SERVER socket over protocol engine `E`.
///
/// All methods take `&self`; share the socket between tasks on the same
/// runtime thread with `Rc`.
///
/// # Example
///
/// ```rust,no_run
/// use keel::{SecurityMechanism, Socket};
///
/// #[compio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Socket::new_client(SecurityMechanism::Null);
///     client.connect("tcp://127.0.0.1:5555").await?;
///     client.send("hello").await?;
///     let reply = client.recv().await?;
///     println!("{reply:?}");
///     client.close().await;
///     Ok(())
/// }
/// ```
pub struct Socket<E: ProtocolEngine = ZmtpEngine> {
    socket_type: SocketType,
    mechanism: SecurityMechanism,
    options: SocketOptions,
    state: Mutex<State<E>>,
    inbound: flume::Receiver<Message>,
    monitor: Option<SocketEventSender>,
}

impl Socket<ZmtpEngine> {
    /// New CLIENT socket (ZMQ_CLIENT) with default options.
    pub fn new_client(mechanism: SecurityMechanism) -> Self {
        Self::with_options(SocketType::Client, mechanism, SocketOptions::default())
    }

    /// New SERVER socket (ZMQ_SERVER) with default options.
    pub fn new_server(mechanism: SecurityMechanism) -> Self {
        Self::with_options(SocketType::Server, mechanism, SocketOptions::default())
    }

    /// New socket with custom options.
    pub fn with_options(
        socket_type: SocketType,
        mechanism: SecurityMechanism,
        options: SocketOptions,
    ) -> Self {
        Self::with_engine(socket_type, mechanism, options)
    }
}

impl<E: ProtocolEngine> Socket<E> {
    /// New socket driven by a custom protocol engine.
    pub fn with_engine(
        socket_type: SocketType,
        mechanism: SecurityMechanism,
        options: SocketOptions,
    ) -> Self {
        let (inbound_tx, inbound) = flume::unbounded();
        Self {
            socket_type,
            mechanism,
            options,
            state: Mutex::new(State {
                connections: Vec::new(),
                inbound_tx: Some(inbound_tx),
                closed: false,
            }),
            inbound,
            monitor: None,
        }
    }

    /// Role fixed at construction.
    pub const fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    /// Security mechanism used for every handshake.
    pub const fn mechanism(&self) -> &SecurityMechanism {
        &self.mechanism
    }

    /// Options fixed at construction.
    pub const fn options(&self) -> &SocketOptions {
        &self.options
    }

    /// Subscribe to lifecycle events.
    ///
    /// Replaces any previous monitor; the old receiver stops getting events.
    pub fn monitor(&mut self) -> SocketMonitor {
        let (sender, receiver) = create_monitor();
        self.monitor = Some(sender);
        receiver
    }

    /// Number of connections ever established (closed ones included).
    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    /// True once [`close`](Self::close) ran.
    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Dial `endpoint` and handshake (CLIENT only).
    ///
    /// Failed dials are retried every `reconnect_ivl` (see [`SocketOptions`]
    /// for backoff, attempt cap and deadline). Handshake failures are not
    /// retried. Dropping the returned future abandons the attempt.
    pub async fn connect(&self, endpoint: &str) -> Result<()> {
        if self.socket_type.as_server() {
            return Err(KeelError::invalid_action("connect", self.socket_type));
        }
        self.ensure_open().await?;
        let endpoint = Endpoint::parse(endpoint)?;

        let connection = match self.options.connect_timeout {
            None => self.dial_and_handshake(&endpoint).await?,
            Some(limit) => with_timeout(Some(limit), self.dial_and_handshake(&endpoint))
                .await
                .map_err(|timeout| {
                    warn!("[CLIENT] Connect to {} timed out after {:?}", endpoint, timeout);
                    self.emit(SocketEvent::ConnectFailed {
                        endpoint: endpoint.clone(),
                        reason: format!("timed out after {timeout:?}"),
                    });
                    KeelError::ConnectTimeout {
                        endpoint: endpoint.clone(),
                        timeout,
                    }
                })??,
        };

        self.attach(connection).await?;
        debug!("[CLIENT] Connected to {}", endpoint);
        self.emit(SocketEvent::Connected(endpoint));
        Ok(())
    }

    /// Listen on `endpoint`, accept one peer and handshake (SERVER only).
    ///
    /// Returns the resolved local address (the real port when binding to port
    /// 0). The same address is announced through the monitor as
    /// [`SocketEvent::Listening`] before the accept starts.
    pub async fn bind(&self, endpoint: &str) -> Result<TransportAddr> {
        if !self.socket_type.as_server() {
            return Err(KeelError::invalid_action("bind", self.socket_type));
        }
        self.ensure_open().await?;
        let endpoint = Endpoint::parse(endpoint)?;

        let listener = Listener::bind(&endpoint).await.map_err(|e| {
            warn!("[SERVER] Bind to {} failed: {}", endpoint, e);
            self.emit(SocketEvent::BindFailed {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            });
            KeelError::Io(e)
        })?;
        let local_addr = listener.local_addr()?;
        let local = local_addr.to_endpoint();
        debug!("[SERVER] Listening on {}", local);
        self.emit(SocketEvent::Listening(local.clone()));

        let transport = listener.accept().await?;
        debug!("[SERVER] Accepted connection on {}", local);
        self.emit(SocketEvent::Accepted(local.clone()));

        let connection = self
            .establish(transport, &local, true)
            .await
            .map_err(|e| KeelError::BindHandshake {
                local_addr: local_addr.clone(),
                source: Box::new(e),
            })?;
        self.attach(connection).await?;

        Ok(local_addr)
    }

    /// Send one message on the first connection.
    ///
    /// A [`close`](Self::close) issued while the write is pending aborts it.
    pub async fn send(&self, body: impl Into<Bytes>) -> Result<()> {
        let body = body.into();
        let connection = {
            let state = self.state.lock().await;
            if state.closed {
                return Err(KeelError::SocketClosed);
            }
            state
                .connections
                .first()
                .cloned()
                .ok_or(KeelError::NotConnected)?
        };

        trace!("[{}] Sending {} bytes to {}", self.socket_type, body.len(), connection.endpoint());
        with_timeout(self.options.send_timeout, connection.send(body))
            .await
            .map_err(KeelError::Timeout)??;
        Ok(())
    }

    /// Receive the next message body from any connection.
    ///
    /// A message that carries an engine error is returned as `Err`.
    pub async fn recv(&self) -> Result<Bytes> {
        Ok(self.recv_message().await?.into_result()?)
    }

    /// Receive the next message with its kind (command or data).
    ///
    /// After [`close`](Self::close), queued messages are still returned; then
    /// this fails with [`KeelError::SocketClosed`].
    pub async fn recv_message(&self) -> Result<Message> {
        let msg = with_timeout(self.options.recv_timeout, self.inbound.recv_async())
            .await
            .map_err(KeelError::Timeout)?
            .map_err(|_| KeelError::SocketClosed)?;
        trace!("[{}] Received {:?} message ({} bytes)", self.socket_type, msg.kind, msg.body.len());
        Ok(msg)
    }

    /// Close every connection. Calling it again does nothing.
    ///
    /// Pending sends are aborted rather than waited for.
    pub async fn close(&self) {
        let connections = {
            let mut state = self.state.lock().await;
            if state.closed {
                trace!("[{}] Already closed", self.socket_type);
                return;
            }
            state.closed = true;
            state.inbound_tx = None;
            state.connections.clone()
        };

        let mut closed = 0usize;
        for connection in &connections {
            if connection.close().await {
                closed += 1;
            }
        }

        debug!("[{}] Closed {} connection(s)", self.socket_type, closed);
        self.emit(SocketEvent::Closed);
    }

    async fn ensure_open(&self) -> Result<()> {
        if self.state.lock().await.closed {
            return Err(KeelError::SocketClosed);
        }
        Ok(())
    }

    async fn dial_and_handshake(&self, endpoint: &Endpoint) -> Result<Connection<E>> {
        let transport = self.dial(endpoint).await?;
        self.establish(transport, endpoint, false).await
    }

    /// Dial until it succeeds, the attempt budget runs out, or the socket is
    /// closed.
    async fn dial(&self, endpoint: &Endpoint) -> Result<Transport> {
        let mut retry = RetryState::new(&self.options);
        loop {
            let err = match Transport::dial(endpoint).await {
                Ok(transport) => {
                    if retry.attempt() > 0 {
                        debug!("[CLIENT] Dialed {} after {} retries", endpoint, retry.attempt());
                    }
                    return Ok(transport);
                }
                Err(e) => e,
            };

            let delay = retry.next_delay();
            if retry.exhausted() {
                warn!("[CLIENT] Giving up on {} after {} attempts: {}", endpoint, retry.attempt(), err);
                self.emit(SocketEvent::ConnectFailed {
                    endpoint: endpoint.clone(),
                    reason: err.to_string(),
                });
                return Err(KeelError::ConnectRetriesExhausted {
                    endpoint: endpoint.clone(),
                    attempts: retry.attempt(),
                    source: err,
                });
            }

            debug!("[CLIENT] Dial {} failed ({}), retrying in {:?}", endpoint, err, delay);
            self.emit(SocketEvent::ConnectRetried {
                endpoint: endpoint.clone(),
                attempt: retry.attempt(),
                delay,
            });
            compio::time::sleep(delay).await;
            self.ensure_open().await?;
        }
    }

    /// Run the handshake on a fresh transport.
    ///
    /// On failure the engine is closed, which shuts the transport down, before
    /// the error is returned.
    async fn establish(
        &self,
        transport: Transport,
        endpoint: &Endpoint,
        as_server: bool,
    ) -> Result<Connection<E>> {
        let mut engine = E::new(transport, &self.options);
        let extra = (!self.options.metadata.is_empty()).then_some(&self.options.metadata);

        let outcome = with_timeout(
            self.options.handshake_deadline(),
            engine.prepare(&self.mechanism, self.socket_type, as_server, extra),
        )
        .await;

        let err = match outcome {
            Ok(Ok(peer)) => {
                debug!("[{}] Handshake with {} peer on {} complete", self.socket_type, peer.socket_type, endpoint);
                return Ok(Connection::new(endpoint.clone(), engine, peer));
            }
            Ok(Err(e)) => KeelError::from(e),
            Err(limit) => KeelError::HandshakeTimeout(limit),
        };

        warn!("[{}] Handshake on {} failed: {}", self.socket_type, endpoint, err);
        engine.close().await;
        self.emit(SocketEvent::HandshakeFailed {
            endpoint: endpoint.clone(),
            reason: err.to_string(),
        });
        Err(err)
    }

    /// Append a handshaken connection and start its receive task.
    async fn attach(&self, mut connection: Connection<E>) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(inbound) = state.inbound_tx.clone() else {
            drop(state);
            debug!("[{}] Socket closed during handshake; dropping {}", self.socket_type, connection.endpoint());
            connection.close().await;
            return Err(KeelError::SocketClosed);
        };

        connection.start(inbound);
        state.connections.push(Rc::new(connection));
        trace!("[{}] {} connection(s)", self.socket_type, state.connections.len());
        Ok(())
    }

    fn emit(&self, event: SocketEvent) {
        if let Some(monitor) = &self.monitor {
            let _ = monitor.send(event);
        }
    }
}
