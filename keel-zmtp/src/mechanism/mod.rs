pub mod null;
pub mod plain;

use bytes::Bytes;
use keel_core::metadata::Metadata;

use crate::codec::ZmtpError;
use crate::command::ZmtpCommand;
use null::NullMechanism;
use plain::{PlainAuthenticator, PlainClientMechanism, PlainCredentials, PlainServerMechanism};

/// Trait implemented by each security mechanism.
///
/// Mechanisms are sans-IO. The handshake driver:
/// - flushes `next_outbound` as COMMAND frames
/// - stops once `is_done`
/// - otherwise reads one command and feeds it to `on_inbound`
///
/// When `on_inbound` fails the driver still flushes `next_outbound` once, so
/// a mechanism can queue an ERROR for the peer before giving up.
pub trait Mechanism {
    /// Name announced in the greeting.
    fn name(&self) -> &'static str;

    /// Feed one inbound command.
    fn on_inbound(&mut self, command: &ZmtpCommand<'_>) -> Result<(), ZmtpError>;

    /// Next command body to send (unframed), if any.
    fn next_outbound(&mut self) -> Option<Bytes>;

    /// Whether the handshake is finished (mechanism satisfied).
    fn is_done(&self) -> bool;

    /// Properties announced by the peer (READY or INITIATE).
    fn peer_metadata(&self) -> &Metadata;
}

/// Security mechanism selected for a socket.
#[derive(Debug, Clone, Default)]
pub enum SecurityMechanism {
    /// ZMTP NULL: no authentication, READY exchange only.
    #[default]
    Null,

    /// PLAIN client side: send credentials in HELLO.
    PlainClient(PlainCredentials),

    /// PLAIN server side: check HELLO credentials.
    PlainServer(PlainAuthenticator),
}

impl SecurityMechanism {
    /// PLAIN client with the given credentials.
    pub fn plain_client(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::PlainClient(PlainCredentials::new(username, password))
    }

    /// Mechanism name as carried in the greeting.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::PlainClient(_) | Self::PlainServer(_) => "PLAIN",
        }
    }

    /// PLAIN needs one side to declare itself the server; NULL does not care.
    pub const fn requires_distinct_roles(&self) -> bool {
        !matches!(self, Self::Null)
    }

    /// Instantiate the state machine for one handshake.
    ///
    /// `local` carries the READY/INITIATE properties of this side.
    pub(crate) fn build(
        &self,
        as_server: bool,
        local: Metadata,
    ) -> Result<Box<dyn Mechanism>, ZmtpError> {
        match (self, as_server) {
            (Self::Null, _) => Ok(Box::new(NullMechanism::new(local))),
            (Self::PlainClient(creds), false) => {
                Ok(Box::new(PlainClientMechanism::new(creds.clone(), local)))
            }
            (Self::PlainServer(auth), true) => {
                Ok(Box::new(PlainServerMechanism::new(auth.clone(), local)))
            }
            (Self::PlainClient(_), true) => Err(ZmtpError::Protocol(
                "PLAIN client credentials configured on a listening socket",
            )),
            (Self::PlainServer(_), false) => Err(ZmtpError::Protocol(
                "PLAIN server configured on a dialing socket",
            )),
        }
    }
}

/// Helper shared by all mechanisms: a peer ERROR aborts the handshake.
#[inline]
pub(crate) fn reject_on_error(command: &ZmtpCommand<'_>) -> Result<(), ZmtpError> {
    if command.is(crate::command::ERROR) {
        return Err(ZmtpError::AuthenticationFailed(command.error_reason()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mechanism_names() {
        assert_eq!(SecurityMechanism::Null.name(), "NULL");
        assert_eq!(SecurityMechanism::plain_client("u", "p").name(), "PLAIN");
        assert_eq!(
            SecurityMechanism::PlainServer(PlainAuthenticator::accept_all()).name(),
            "PLAIN"
        );
    }

    #[test]
    fn test_plain_roles_are_checked() {
        let client = SecurityMechanism::plain_client("u", "p");
        assert!(client.build(false, Metadata::new()).is_ok());
        assert!(client.build(true, Metadata::new()).is_err());

        let server = SecurityMechanism::PlainServer(PlainAuthenticator::accept_all());
        assert!(server.build(true, Metadata::new()).is_ok());
        assert!(server.build(false, Metadata::new()).is_err());
    }
}
