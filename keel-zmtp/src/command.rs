use crate::codec::{Result, ZmtpError};
use bytes::{BufMut, Bytes, BytesMut};
use keel_core::metadata::Metadata;

pub const READY: &[u8] = b"READY";
pub const ERROR: &[u8] = b"ERROR";
pub const HELLO: &[u8] = b"HELLO";
pub const WELCOME: &[u8] = b"WELCOME";
pub const INITIATE: &[u8] = b"INITIATE";

/// Parsed ZMTP command (borrowed views into the frame payload).
#[derive(Debug, Clone, Copy)]
pub struct ZmtpCommand<'a> {
    pub name: &'a [u8],
    pub body: &'a [u8],
}

impl<'a> ZmtpCommand<'a> {
    /// Split a command frame payload into name and body.
    ///
    /// Input is the frame payload (NOT including flags/size header):
    /// `[name_len: u8][name][body...]`.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (&name_len, rest) = payload
            .split_first()
            .ok_or(ZmtpError::Protocol("empty command frame"))?;
        let name_len = name_len as usize;
        if rest.len() < name_len {
            return Err(ZmtpError::Protocol("truncated command name"));
        }
        let (name, body) = rest.split_at(name_len);
        Ok(Self { name, body })
    }

    #[inline]
    pub fn is(&self, name: &[u8]) -> bool {
        self.name == name
    }

    pub fn name_str(&self) -> &str {
        std::str::from_utf8(self.name).unwrap_or("<binary>")
    }

    /// Decode the body as a property list (READY / INITIATE).
    pub fn properties(&self) -> Result<Metadata> {
        parse_properties(self.body)
    }

    /// Decode the body of an ERROR command: `[reason_len: u8][reason]`.
    pub fn error_reason(&self) -> String {
        match self.body.split_first() {
            Some((&len, rest)) => {
                let len = (len as usize).min(rest.len());
                String::from_utf8_lossy(&rest[..len]).into_owned()
            }
            None => String::new(),
        }
    }
}

/// Build a command body with an opaque payload.
pub fn encode_command(name: &[u8], body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(1 + name.len() + body.len());
    out.put_u8(name.len() as u8);
    out.extend_from_slice(name);
    out.extend_from_slice(body);
    out.freeze()
}

/// Build a READY command body carrying `props`.
///
/// Grammar (ZMTP/37):
/// - 1 byte: command name length, then the name
/// - Repeated properties:
///   - 1 byte: property name length, then the name
///   - 4 bytes: value length (BE), then the value
pub fn encode_ready(props: &Metadata) -> Bytes {
    encode_with_properties(READY, props)
}

pub fn encode_initiate(props: &Metadata) -> Bytes {
    encode_with_properties(INITIATE, props)
}

/// ERROR reasons are capped at 255 bytes on the wire.
pub fn encode_error(reason: &str) -> Bytes {
    let reason = &reason.as_bytes()[..reason.len().min(255)];
    let mut body = Vec::with_capacity(1 + reason.len());
    body.push(reason.len() as u8);
    body.extend_from_slice(reason);
    encode_command(ERROR, &body)
}

fn encode_with_properties(name: &[u8], props: &Metadata) -> Bytes {
    let mut out = BytesMut::new();
    out.put_u8(name.len() as u8);
    out.extend_from_slice(name);
    for (prop, value) in props.iter() {
        put_property(&mut out, prop, value);
    }
    out.freeze()
}

#[inline]
fn put_property(dst: &mut BytesMut, name: &str, value: &[u8]) {
    let name_bytes = name.as_bytes();

    dst.put_u8(name_bytes.len() as u8);
    dst.extend_from_slice(name_bytes);

    dst.put_u32(value.len() as u32);
    dst.extend_from_slice(value);
}

/// Parse a property list into owned metadata.
pub fn parse_properties(mut data: &[u8]) -> Result<Metadata> {
    let mut props = Metadata::new();

    while let Some((&name_len, rest)) = data.split_first() {
        let name_len = name_len as usize;
        if rest.len() < name_len + 4 {
            return Err(ZmtpError::Protocol("truncated property"));
        }
        let (name, rest) = rest.split_at(name_len);
        let (len, rest) = rest.split_at(4);
        let value_len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
        if rest.len() < value_len {
            return Err(ZmtpError::Protocol("truncated property value"));
        }
        let (value, rest) = rest.split_at(value_len);

        props.insert(
            String::from_utf8_lossy(name).into_owned(),
            Bytes::copy_from_slice(value),
        );
        data = rest;
    }

    Ok(props)
}
