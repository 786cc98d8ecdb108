//! Raw byte-stream transports (TCP and Unix domain sockets).
//!
//! [`Transport`] wraps a connected compio stream. Protocol engines split it
//! into a [`TransportReader`] for the background receive task and a
//! [`TransportWriter`] for sends and shutdown. [`Listener`] performs the
//! single accept done by `bind`.

use compio::buf::{BufResult, IoBufMut};
use compio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use compio::net::{OwnedReadHalf, OwnedWriteHalf, TcpListener, TcpStream};
#[cfg(unix)]
use compio::net::{UnixListener, UnixStream};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::trace;

use crate::endpoint::{Endpoint, Scheme};

/// Address of one side of a transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransportAddr {
    Tcp(SocketAddr),
    Ipc(PathBuf),
}

impl TransportAddr {
    /// The endpoint a peer would use to reach this address.
    pub fn to_endpoint(&self) -> Endpoint {
        match self {
            Self::Tcp(addr) => Endpoint::tcp(*addr),
            Self::Ipc(path) => Endpoint::ipc(path),
        }
    }
}

impl fmt::Display for TransportAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            Self::Ipc(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}

/// A connected byte stream.
///
/// Used whole by raw peers; a protocol engine splits it with
/// [`into_split`](Self::into_split) so the receive task owns the read half.
#[derive(Debug)]
pub enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Ipc(UnixStream),
}

impl Transport {
    /// Open a transport to `endpoint` (one attempt, no retry).
    pub async fn dial(endpoint: &Endpoint) -> io::Result<Self> {
        trace!("[TRANSPORT] Dialing {}", endpoint);
        match endpoint.scheme() {
            Scheme::Tcp => Ok(Self::Tcp(TcpStream::connect(endpoint.address()).await?)),
            #[cfg(unix)]
            Scheme::Ipc => Ok(Self::Ipc(UnixStream::connect(endpoint.address()).await?)),
            #[cfg(not(unix))]
            Scheme::Ipc => Err(unsupported()),
        }
    }

    /// Split into independently owned read and write halves.
    pub fn into_split(self) -> (TransportReader, TransportWriter) {
        match self {
            Self::Tcp(s) => {
                let (r, w) = s.into_split();
                (TransportReader::Tcp(r), TransportWriter::Tcp(w))
            }
            #[cfg(unix)]
            Self::Ipc(s) => {
                let (r, w) = s.into_split();
                (TransportReader::Ipc(r), TransportWriter::Ipc(w))
            }
        }
    }

    /// Read whatever is available into `buf`'s spare capacity.
    ///
    /// A result of `Ok(0)` means the peer closed the stream.
    pub async fn read<B: IoBufMut>(&mut self, buf: B) -> BufResult<usize, B> {
        match self {
            Self::Tcp(s) => s.read(buf).await,
            #[cfg(unix)]
            Self::Ipc(s) => s.read(buf).await,
        }
    }

    /// Fill `buf` completely.
    pub async fn read_exact<B: IoBufMut>(&mut self, buf: B) -> BufResult<(), B> {
        match self {
            Self::Tcp(s) => s.read_exact(buf).await,
            #[cfg(unix)]
            Self::Ipc(s) => s.read_exact(buf).await,
        }
    }

    /// Write the whole buffer.
    pub async fn write_all(&mut self, buf: Vec<u8>) -> io::Result<()> {
        let BufResult(res, _) = match self {
            Self::Tcp(s) => s.write_all(buf).await,
            #[cfg(unix)]
            Self::Ipc(s) => s.write_all(buf).await,
        };
        res
    }

    /// Shut down the write side; the peer observes EOF.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.shutdown().await,
            #[cfg(unix)]
            Self::Ipc(s) => s.shutdown().await,
        }
    }
}

/// Read half of a split [`Transport`].
#[derive(Debug)]
pub enum TransportReader {
    Tcp(OwnedReadHalf<TcpStream>),
    #[cfg(unix)]
    Ipc(OwnedReadHalf<UnixStream>),
}

impl TransportReader {
    /// Read whatever is available into `buf`'s spare capacity.
    ///
    /// A result of `Ok(0)` means the peer closed the stream.
    pub async fn read<B: IoBufMut>(&mut self, buf: B) -> BufResult<usize, B> {
        match self {
            Self::Tcp(r) => r.read(buf).await,
            #[cfg(unix)]
            Self::Ipc(r) => r.read(buf).await,
        }
    }

    /// Fill `buf` completely.
    pub async fn read_exact<B: IoBufMut>(&mut self, buf: B) -> BufResult<(), B> {
        match self {
            Self::Tcp(r) => r.read_exact(buf).await,
            #[cfg(unix)]
            Self::Ipc(r) => r.read_exact(buf).await,
        }
    }
}

/// Write half of a split [`Transport`].
#[derive(Debug)]
pub enum TransportWriter {
    Tcp(OwnedWriteHalf<TcpStream>),
    #[cfg(unix)]
    Ipc(OwnedWriteHalf<UnixStream>),
}

impl TransportWriter {
    /// Write the whole buffer.
    pub async fn write_all(&mut self, buf: Vec<u8>) -> io::Result<()> {
        let BufResult(res, _) = match self {
            Self::Tcp(w) => w.write_all(buf).await,
            #[cfg(unix)]
            Self::Ipc(w) => w.write_all(buf).await,
        };
        res
    }

    /// Shut down the write side; the peer observes EOF.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(w) => w.shutdown().await,
            #[cfg(unix)]
            Self::Ipc(w) => w.shutdown().await,
        }
    }
}

/// A bound listener, used for exactly one accept per `bind`.
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Ipc(IpcListener),
}

/// Unix listener that unlinks its socket file when dropped.
#[cfg(unix)]
pub struct IpcListener {
    listener: UnixListener,
    path: PathBuf,
}

#[cfg(unix)]
impl Drop for IpcListener {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            trace!("[TRANSPORT] Could not remove {}: {}", self.path.display(), e);
        }
    }
}

impl Listener {
    /// Start listening on `endpoint`. Fails immediately, without retry.
    pub async fn bind(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint.scheme() {
            Scheme::Tcp => Ok(Self::Tcp(TcpListener::bind(endpoint.address()).await?)),
            #[cfg(unix)]
            Scheme::Ipc => {
                let path = PathBuf::from(endpoint.address());
                // A stale socket file from a previous run blocks bind
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                let listener = UnixListener::bind(&path).await?;
                Ok(Self::Ipc(IpcListener { listener, path }))
            }
            #[cfg(not(unix))]
            Scheme::Ipc => Err(unsupported()),
        }
    }

    /// Resolved local address (the real port when bound to port 0).
    pub fn local_addr(&self) -> io::Result<TransportAddr> {
        match self {
            Self::Tcp(l) => l.local_addr().map(TransportAddr::Tcp),
            #[cfg(unix)]
            Self::Ipc(ipc) => Ok(TransportAddr::Ipc(ipc.path.clone())),
        }
    }

    /// Accept one inbound connection.
    pub async fn accept(&self) -> io::Result<Transport> {
        match self {
            Self::Tcp(l) => {
                let (stream, peer) = l.accept().await?;
                trace!("[TRANSPORT] Accepted tcp peer {}", peer);
                Ok(Transport::Tcp(stream))
            }
            #[cfg(unix)]
            Self::Ipc(ipc) => {
                let (stream, _) = ipc.listener.accept().await?;
                Ok(Transport::Ipc(stream))
            }
        }
    }
}

#[cfg(not(unix))]
fn unsupported() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "IPC transport not supported on this platform")
}
