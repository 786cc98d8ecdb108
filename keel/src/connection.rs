//! Connection record: one established, handshaken peer of a socket.

use async_lock::Mutex;
use bytes::Bytes;
use keel_core::endpoint::Endpoint;
use keel_zmtp::{Message, PeerInfo, ProtocolEngine, ZmtpError};
use std::cell::RefCell;
use tracing::debug;

/// A handshaken engine and what it learned about the peer.
///
/// Sends to one connection are serialized by the engine lock, independent of
/// the socket's own state. Records are never removed from a socket; closing
/// one only releases its resources.
pub struct Connection<E> {
    endpoint: Endpoint,
    engine: Mutex<E>,
    peer: PeerInfo,
    /// Dropped on close, which wakes every send still in flight.
    closing: RefCell<Option<flume::Sender<()>>>,
    closed: flume::Receiver<()>,
}

impl<E: ProtocolEngine> Connection<E> {
    pub(crate) fn new(endpoint: Endpoint, engine: E, peer: PeerInfo) -> Self {
        let (closing, closed) = flume::bounded(1);
        Self {
            endpoint,
            engine: Mutex::new(engine),
            peer,
            closing: RefCell::new(Some(closing)),
            closed,
        }
    }

    /// Remote endpoint for dialed connections, local endpoint for accepted ones.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// What the handshake learned about the peer.
    pub fn peer(&self) -> &PeerInfo {
        &self.peer
    }

    /// True once the owning socket closed this record.
    pub fn is_closed(&self) -> bool {
        self.closing.borrow().is_none()
    }

    /// Start inbound delivery into the socket's shared channel.
    pub(crate) fn start(&mut self, inbound: flume::Sender<Message>) {
        self.engine.get_mut().recv(inbound);
    }

    /// Write one frame. A concurrent [`close`](Self::close) aborts the write
    /// and this returns [`ZmtpError::Closed`].
    pub(crate) async fn send(&self, body: Bytes) -> Result<(), ZmtpError> {
        use futures::{select, FutureExt};

        if self.is_closed() {
            return Err(ZmtpError::Closed);
        }

        let write = async {
            let mut engine = self.engine.lock().await;
            engine.send_frame(body).await
        };

        select! {
            res = write.fuse() => res,
            _ = self.closed.recv_async().fuse() => {
                debug!("[CONNECTION] Send to {} interrupted by close", self.endpoint);
                Err(ZmtpError::Closed)
            }
        }
    }

    /// Abort in-flight sends, stop the engine and shut the transport down.
    ///
    /// Returns `false` when the record was already closed.
    pub(crate) async fn close(&self) -> bool {
        let Some(closing) = self.closing.borrow_mut().take() else {
            return false;
        };
        drop(closing);

        self.engine.lock().await.close().await;
        debug!("[CONNECTION] Closed connection {}", self.endpoint);
        true
    }
}
