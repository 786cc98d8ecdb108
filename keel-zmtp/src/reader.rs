//! Buffered frame reader over the read half of a transport.
//!
//! Bytes read past the end of one frame stay in `pending`, so nothing is lost
//! when the reader moves from the handshake into the receive task.

use bytes::{Bytes, BytesMut};
use compio::buf::BufResult;
use keel_core::transport::TransportReader;

use crate::codec::{Result, ZmtpDecoder, ZmtpError, ZmtpFrame};
use crate::greeting::GREETING_SIZE;

pub(crate) struct FrameReader {
    transport: TransportReader,
    decoder: ZmtpDecoder,
    pending: Bytes,
    read_size: usize,
}

impl FrameReader {
    pub(crate) fn new(transport: TransportReader, read_size: usize) -> Self {
        Self {
            transport,
            decoder: ZmtpDecoder::new(),
            pending: Bytes::new(),
            read_size: read_size.max(64),
        }
    }

    /// Read the fixed-size peer greeting.
    ///
    /// Must be called before any frame is read.
    pub(crate) async fn read_greeting(&mut self) -> Result<[u8; GREETING_SIZE]> {
        debug_assert!(self.pending.is_empty());
        let BufResult(res, buf) = self.transport.read_exact([0u8; GREETING_SIZE]).await;
        res.map_err(eof_as_closed)?;
        Ok(buf)
    }

    /// Next complete frame, or `None` on a clean EOF between frames.
    pub(crate) async fn next_frame(&mut self) -> Result<Option<ZmtpFrame>> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.pending)? {
                return Ok(Some(frame));
            }

            let buf = Vec::with_capacity(self.read_size);
            let BufResult(res, buf) = self.transport.read(buf).await;
            if res? == 0 {
                if self.pending.is_empty() && !self.decoder.is_mid_frame() {
                    return Ok(None);
                }
                return Err(ZmtpError::Incomplete);
            }

            self.pending = if self.pending.is_empty() {
                Bytes::from(buf)
            } else {
                let mut merged = BytesMut::with_capacity(self.pending.len() + buf.len());
                merged.extend_from_slice(&self.pending);
                merged.extend_from_slice(&buf);
                merged.freeze()
            };
        }
    }
}

fn eof_as_closed(err: std::io::Error) -> ZmtpError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        ZmtpError::Closed
    } else {
        ZmtpError::Io(err)
    }
}
