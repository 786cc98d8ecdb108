//! Protocol engine: the per-connection half of a socket.
//!
//! A socket owns one engine per connection. The engine runs the handshake,
//! writes outbound frames, and feeds inbound frames into the socket's shared
//! channel from a background task. The transport is split on construction:
//! the receive task owns the read half, the engine keeps the write half.

use bytes::Bytes;
use compio::runtime::Task;
use keel_core::metadata::Metadata;
use keel_core::options::SocketOptions;
use keel_core::socket_type::SocketType;
use keel_core::transport::{Transport, TransportWriter};
use tracing::{debug, trace, warn};

use crate::codec::{encode_frame, ZmtpError};
use crate::handshake::perform_handshake;
use crate::mechanism::SecurityMechanism;
use crate::message::Message;
use crate::reader::FrameReader;

/// What the handshake learned about the peer.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub socket_type: SocketType,
    pub mechanism: &'static str,
    pub as_server: bool,
    pub metadata: Metadata,
}

impl PeerInfo {
    /// Peer `Identity` property, if it sent a non-empty one.
    pub fn identity(&self) -> Option<&Bytes> {
        self.metadata.get("Identity").filter(|id| !id.is_empty())
    }
}

/// Per-connection protocol engine.
///
/// Lifecycle: `new` → `prepare` (handshake) → `recv` (start delivery) →
/// any number of `send_frame` → `close`.
#[async_trait::async_trait(?Send)]
pub trait ProtocolEngine: Sized {
    /// Take ownership of a freshly connected transport. No I/O happens here.
    fn new(transport: Transport, options: &SocketOptions) -> Self;

    /// Run the handshake on the transport.
    async fn prepare(
        &mut self,
        mechanism: &SecurityMechanism,
        socket_type: SocketType,
        as_server: bool,
        extra: Option<&Metadata>,
    ) -> Result<PeerInfo, ZmtpError>;

    /// Start delivering inbound messages into `inbound`.
    ///
    /// Returns immediately; delivery happens in the background until the
    /// connection ends or `close` is called.
    fn recv(&mut self, inbound: flume::Sender<Message>);

    /// Write one single-part data frame.
    async fn send_frame(&mut self, body: Bytes) -> Result<(), ZmtpError>;

    /// Stop delivery and shut the transport down; the peer observes EOF.
    ///
    /// Idempotent.
    async fn close(&mut self);
}

/// ZMTP 3.1 engine.
pub struct ZmtpEngine {
    writer: Option<TransportWriter>,
    reader: Option<FrameReader>,
    recv_task: Option<Task<()>>,
    peer: Option<PeerInfo>,
}

impl ZmtpEngine {
    /// Peer information, once `prepare` succeeded.
    pub fn peer(&self) -> Option<&PeerInfo> {
        self.peer.as_ref()
    }
}

#[async_trait::async_trait(?Send)]
impl ProtocolEngine for ZmtpEngine {
    fn new(transport: Transport, options: &SocketOptions) -> Self {
        let (reader, writer) = transport.into_split();
        Self {
            writer: Some(writer),
            reader: Some(FrameReader::new(reader, options.read_buffer_size)),
            recv_task: None,
            peer: None,
        }
    }

    async fn prepare(
        &mut self,
        mechanism: &SecurityMechanism,
        socket_type: SocketType,
        as_server: bool,
        extra: Option<&Metadata>,
    ) -> Result<PeerInfo, ZmtpError> {
        let (Some(writer), Some(reader)) = (self.writer.as_mut(), self.reader.as_mut()) else {
            return Err(ZmtpError::Closed);
        };
        let peer = perform_handshake(writer, reader, mechanism, socket_type, as_server, extra).await?;
        self.peer = Some(peer.clone());
        Ok(peer)
    }

    fn recv(&mut self, inbound: flume::Sender<Message>) {
        let Some(reader) = self.reader.take() else {
            warn!("[ENGINE] recv called twice or after close; ignoring");
            return;
        };
        self.recv_task = Some(compio::runtime::spawn(receive_loop(reader, inbound)));
    }

    async fn send_frame(&mut self, body: Bytes) -> Result<(), ZmtpError> {
        let writer = self.writer.as_mut().ok_or(ZmtpError::Closed)?;
        trace!("[ENGINE] Sending {} byte frame", body.len());
        writer.write_all(encode_frame(0, &body)).await?;
        Ok(())
    }

    async fn close(&mut self) {
        // Dropping the task handle cancels the receive loop
        if self.recv_task.take().is_some() {
            debug!("[ENGINE] Receive task cancelled");
        }
        self.reader = None;

        let Some(mut writer) = self.writer.take() else {
            return;
        };
        if let Err(e) = writer.shutdown().await {
            // The peer may have gone first
            trace!("[ENGINE] Shutdown failed: {}", e);
        }
    }
}

/// Forward every inbound frame until EOF, an error, or the socket drops the
/// channel. A read or decode error is delivered once, then the loop ends.
async fn receive_loop(mut reader: FrameReader, inbound: flume::Sender<Message>) {
    loop {
        let msg = match reader.next_frame().await {
            Ok(Some(frame)) => Message::from_frame(frame),
            Ok(None) => {
                debug!("[ENGINE] Peer closed the connection");
                return;
            }
            Err(e) => {
                debug!("[ENGINE] Receive failed: {}", e);
                let _ = inbound.send_async(Message::failed(e)).await;
                return;
            }
        };

        if inbound.send_async(msg).await.is_err() {
            trace!("[ENGINE] Inbound channel closed");
            return;
        }
    }
}
