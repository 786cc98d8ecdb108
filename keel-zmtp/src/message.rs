use bytes::Bytes;

use crate::codec::{ZmtpError, ZmtpFrame};

/// Kind of frame a [`Message`] was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Protocol command (PING, SUBSCRIBE, ...) arriving after the handshake.
    Command,
    /// Application data.
    Data,
}

/// One inbound unit delivered by a protocol engine to its socket.
///
/// A message either carries a body or, when `err` is set, reports why the
/// connection stopped producing messages.
#[derive(Debug)]
pub struct Message {
    pub body: Bytes,
    pub kind: MessageKind,
    pub err: Option<ZmtpError>,
}

impl Message {
    pub fn data(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            kind: MessageKind::Data,
            err: None,
        }
    }

    pub fn command(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            kind: MessageKind::Command,
            err: None,
        }
    }

    pub fn failed(err: ZmtpError) -> Self {
        Self {
            body: Bytes::new(),
            kind: MessageKind::Data,
            err: Some(err),
        }
    }

    /// Classify a decoded frame.
    ///
    /// CLIENT/SERVER sockets are single-part: a data frame with MORE set is
    /// reported as an error carrying the frame body.
    pub(crate) fn from_frame(frame: ZmtpFrame) -> Self {
        if frame.is_command() {
            Self::command(frame.payload)
        } else if frame.more() {
            Self {
                body: frame.payload,
                kind: MessageKind::Data,
                err: Some(ZmtpError::MultipartUnsupported),
            }
        } else {
            Self::data(frame.payload)
        }
    }

    #[inline]
    pub fn is_command(&self) -> bool {
        self.kind == MessageKind::Command
    }

    /// Body on success, the carried error otherwise.
    pub fn into_result(self) -> Result<Bytes, ZmtpError> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(self.body),
        }
    }
}
