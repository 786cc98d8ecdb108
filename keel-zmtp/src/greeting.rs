use crate::codec::{Result, ZmtpError};

/// ZMTP Greeting is always exactly 64 bytes
pub const GREETING_SIZE: usize = 64;

pub const VERSION_MAJOR: u8 = 3;
pub const VERSION_MINOR: u8 = 1;

const SIGNATURE_HEAD: u8 = 0xFF;
const SIGNATURE_TAIL: u8 = 0x7F;
const MECHANISM_RANGE: std::ops::Range<usize> = 12..32;
const AS_SERVER_OFFSET: usize = 32;

/// Parsed greeting information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZmtpGreeting {
    pub major: u8,
    pub minor: u8,
    pub mechanism: String,
    pub as_server: bool,
}

impl ZmtpGreeting {
    /// Greeting announced by this side (always ZMTP 3.1).
    pub fn new(mechanism: &str, as_server: bool) -> Self {
        Self {
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            mechanism: mechanism.to_string(),
            as_server,
        }
    }

    /// Serialize to the 64-byte wire form.
    ///
    /// Layout (ZMTP 3.x):
    /// ```text
    /// [0]      0xFF
    /// [1..9]   Padding
    /// [9]      0x7F
    /// [10]     Major version
    /// [11]     Minor version
    /// [12..32] Mechanism (ASCII, null-padded)
    /// [32]     As-Server flag
    /// [33..64] Padding
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; GREETING_SIZE];
        out[0] = SIGNATURE_HEAD;
        out[9] = SIGNATURE_TAIL;
        out[10] = self.major;
        out[11] = self.minor;

        let name = self.mechanism.as_bytes();
        let len = name.len().min(MECHANISM_RANGE.len());
        out[MECHANISM_RANGE.start..MECHANISM_RANGE.start + len].copy_from_slice(&name[..len]);

        out[AS_SERVER_OFFSET] = u8::from(self.as_server);
        out
    }

    /// Parse a 64-byte ZMTP greeting.
    ///
    /// Any 3.x version is accepted; the lower of the two versions wins, and
    /// everything this crate speaks is common to 3.0 and 3.1.
    pub fn parse(src: &[u8]) -> Result<Self> {
        if src.len() < GREETING_SIZE {
            return Err(ZmtpError::Incomplete);
        }

        if src[0] != SIGNATURE_HEAD || src[9] != SIGNATURE_TAIL {
            return Err(ZmtpError::InvalidGreeting("bad signature"));
        }

        let major = src[10];
        if major < VERSION_MAJOR {
            return Err(ZmtpError::InvalidGreeting("peer speaks ZMTP < 3.0"));
        }

        let mechanism = std::str::from_utf8(&src[MECHANISM_RANGE])
            .map_err(|_| ZmtpError::InvalidGreeting("mechanism is not ASCII"))?
            .trim_end_matches('\0')
            .to_string();

        Ok(Self {
            major,
            minor: src[11],
            mechanism,
            as_server: (src[AS_SERVER_OFFSET] & 0x01) != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let wire = ZmtpGreeting::new("PLAIN", true).encode();
        assert_eq!(wire.len(), GREETING_SIZE);
        assert_eq!(wire[0], 0xFF);
        assert_eq!(wire[9], 0x7F);
        assert_eq!(&wire[10..12], &[3, 1]);
        assert_eq!(&wire[12..17], b"PLAIN");
        assert!(wire[17..32].iter().all(|b| *b == 0));
        assert_eq!(wire[32], 1);
    }

    #[test]
    fn test_parse_accepts_zmtp_30() {
        let mut wire = ZmtpGreeting::new("NULL", false).encode();
        wire[11] = 0;
        let greeting = ZmtpGreeting::parse(&wire).unwrap();
        assert_eq!(greeting.major, 3);
        assert_eq!(greeting.minor, 0);
        assert_eq!(greeting.mechanism, "NULL");
        assert!(!greeting.as_server);
    }

    #[test]
    fn test_parse_rejects_bad_signature() {
        let mut wire = ZmtpGreeting::new("NULL", false).encode();
        wire[9] = 0;
        assert!(matches!(
            ZmtpGreeting::parse(&wire),
            Err(ZmtpError::InvalidGreeting(_))
        ));
    }

    #[test]
    fn test_parse_rejects_old_major() {
        let mut wire = ZmtpGreeting::new("NULL", false).encode();
        wire[10] = 2;
        assert!(ZmtpGreeting::parse(&wire).is_err());
    }

    #[test]
    fn test_parse_short_input() {
        assert!(matches!(
            ZmtpGreeting::parse(&[0xFF; 10]),
            Err(ZmtpError::Incomplete)
        ));
    }
}
