use bytes::{Buf, BufMut, Bytes, BytesMut};
use keel_core::error::KeelError;
use keel_core::socket_type::SocketType;
use std::io;
use thiserror::Error;

/// ZMTP frame flags
pub const FLAG_MORE: u8 = 0x01;
pub const FLAG_LONG: u8 = 0x02;
pub const FLAG_COMMAND: u8 = 0x04;
const FLAG_RESERVED: u8 = 0xF8;

/// ZMTP protocol errors
#[derive(Debug, Error)]
pub enum ZmtpError {
    #[error("Incomplete frame")]
    Incomplete,

    #[error("Protocol violation: reserved bits set")]
    ReservedBits,

    #[error("Protocol violation: frame size too large")]
    SizeTooLarge,

    #[error("Protocol violation: {0}")]
    Protocol(&'static str),

    #[error("Invalid greeting: {0}")]
    InvalidGreeting(&'static str),

    #[error("Security mechanism mismatch: local {local}, peer {peer}")]
    MechanismMismatch { local: &'static str, peer: String },

    #[error("Incompatible peer socket type {peer} for {local}")]
    IncompatiblePeer { local: SocketType, peer: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Multipart messages are not supported by CLIENT/SERVER sockets")]
    MultipartUnsupported,

    #[error("Connection closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for ZMTP operations
pub type Result<T> = std::result::Result<T, ZmtpError>;

impl From<ZmtpError> for KeelError {
    fn from(err: ZmtpError) -> Self {
        match err {
            ZmtpError::Io(e) => Self::Io(e),
            ZmtpError::AuthenticationFailed(reason) => Self::Authentication(reason),
            ZmtpError::Closed => Self::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the connection",
            )),
            other => Self::Protocol(other.to_string()),
        }
    }
}

/// A decoded ZMTP frame
#[derive(Debug, Clone)]
pub struct ZmtpFrame {
    pub flags: u8,
    pub payload: Bytes,
}

impl ZmtpFrame {
    #[inline]
    pub const fn more(&self) -> bool {
        (self.flags & FLAG_MORE) != 0
    }

    #[inline]
    pub const fn is_command(&self) -> bool {
        (self.flags & FLAG_COMMAND) != 0
    }
}

/// Encode a complete ZMTP frame (header + body) into an owned buffer ready
/// for a single `write_all`.
///
/// The LONG flag is derived from the body length; callers only pass
/// MORE / COMMAND.
pub fn encode_frame(flags: u8, body: &[u8]) -> Vec<u8> {
    let len = body.len();
    let mut out = Vec::with_capacity(if len <= 255 { 2 } else { 9 } + len);

    if len <= 255 {
        out.put_u8(flags & !FLAG_LONG);
        out.put_u8(len as u8);
    } else {
        out.put_u8(flags | FLAG_LONG);
        out.put_u64(len as u64);
    }

    out.extend_from_slice(body);
    out
}

/// Stateful ZMTP decoder
///
/// Fast path:
/// - Entire frame present → zero-copy slice
///
/// Slow path:
/// - Fragmented frame → reassemble into `BytesMut`
#[derive(Debug, Default)]
pub struct ZmtpDecoder {
    // Fragmentation state
    pending_flags: Option<u8>,
    expected_body_len: usize,
    staging: BytesMut,
}

impl ZmtpDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a fragmented frame body is being reassembled.
    #[inline]
    pub const fn is_mid_frame(&self) -> bool {
        self.pending_flags.is_some()
    }

    /// Decode a single frame from `src`
    ///
    /// Returns:
    /// - Ok(Some(frame)) → frame decoded
    /// - Ok(None) → need more data (partial headers are left in `src`)
    /// - Err → protocol violation
    pub fn decode(&mut self, src: &mut Bytes) -> Result<Option<ZmtpFrame>> {
        if let Some(flags) = self.pending_flags {
            let take = (self.expected_body_len - self.staging.len()).min(src.len());
            self.staging.extend_from_slice(&src.split_to(take));

            if self.staging.len() < self.expected_body_len {
                return Ok(None);
            }

            self.pending_flags = None;
            self.expected_body_len = 0;
            let payload = self.staging.split().freeze();
            return Ok(Some(ZmtpFrame { flags, payload }));
        }

        if src.len() < 2 {
            return Ok(None);
        }

        let flags = src[0];
        if (flags & FLAG_RESERVED) != 0 {
            return Err(ZmtpError::ReservedBits);
        }

        let header_len = if (flags & FLAG_LONG) != 0 { 9 } else { 2 };
        if src.len() < header_len {
            return Ok(None);
        }

        let body_len = if header_len == 9 {
            let size = (&src[1..9]).get_u64();
            // MSB must be zero in ZMTP 3.x
            if size > 0x7FFF_FFFF_FFFF_FFFF {
                return Err(ZmtpError::SizeTooLarge);
            }
            usize::try_from(size).map_err(|_| ZmtpError::SizeTooLarge)?
        } else {
            src[1] as usize
        };

        src.advance(header_len);

        if src.len() >= body_len {
            let payload = src.split_to(body_len);
            return Ok(Some(ZmtpFrame { flags, payload }));
        }

        // Body split across reads: stash what we have
        self.pending_flags = Some(flags);
        self.expected_body_len = body_len;
        self.staging.clear();
        self.staging.extend_from_slice(&src.split_to(src.len()));

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_frame_encoding() {
        let encoded = encode_frame(0, b"ping");
        assert_eq!(encoded, [0x00, 4, b'p', b'i', b'n', b'g']);

        let encoded = encode_frame(FLAG_COMMAND, b"");
        assert_eq!(encoded, [FLAG_COMMAND, 0]);
    }

    #[test]
    fn test_long_frame_encoding() {
        let body = vec![7u8; 300];
        let encoded = encode_frame(0, &body);
        assert_eq!(encoded[0], FLAG_LONG);
        assert_eq!(&encoded[1..9], &300u64.to_be_bytes());
        assert_eq!(encoded.len(), 9 + 300);
    }

    #[test]
    fn test_decode_single_frame() {
        let mut decoder = ZmtpDecoder::new();
        let mut src = Bytes::from(encode_frame(FLAG_MORE, b"abc"));

        let frame = decoder.decode(&mut src).unwrap().unwrap();
        assert!(frame.more());
        assert!(!frame.is_command());
        assert_eq!(frame.payload.as_ref(), b"abc");
        assert!(src.is_empty());
    }

    #[test]
    fn test_decode_fragmented_body() {
        let body = vec![1u8; 400];
        let wire = encode_frame(0, &body);
        let mut decoder = ZmtpDecoder::new();

        let mut first = Bytes::copy_from_slice(&wire[..100]);
        assert!(decoder.decode(&mut first).unwrap().is_none());
        assert!(decoder.is_mid_frame());

        let mut rest = Bytes::copy_from_slice(&wire[100..]);
        let frame = decoder.decode(&mut rest).unwrap().unwrap();
        assert_eq!(frame.payload.len(), 400);
        assert!(!decoder.is_mid_frame());
    }

    #[test]
    fn test_partial_header_is_not_consumed() {
        let mut decoder = ZmtpDecoder::new();
        let mut src = Bytes::from_static(&[FLAG_LONG, 0, 0]);
        assert!(decoder.decode(&mut src).unwrap().is_none());
        assert_eq!(src.len(), 3);
        assert!(!decoder.is_mid_frame());
    }

    #[test]
    fn test_reserved_bits_rejected() {
        let mut decoder = ZmtpDecoder::new();
        let mut src = Bytes::from_static(&[0x80, 0]);
        assert!(matches!(decoder.decode(&mut src), Err(ZmtpError::ReservedBits)));
    }

    #[test]
    fn test_error_conversion() {
        let err: KeelError = ZmtpError::AuthenticationFailed("denied".into()).into();
        assert!(matches!(err, KeelError::Authentication(r) if r == "denied"));

        let err: KeelError = ZmtpError::Protocol("bad").into();
        assert!(matches!(err, KeelError::Protocol(_)));
    }
}
