use crate::codec::ZmtpError;
use crate::command::{encode_ready, ZmtpCommand, READY};
use crate::mechanism::{reject_on_error, Mechanism};
use bytes::Bytes;
use keel_core::metadata::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NullState {
    /// READY queued, waiting for the peer's READY.
    NeedRecvReady,
    /// Handshake done.
    Done,
}

/// NULL mechanism for ZMTP 3.x (ZMTP/NULL).
///
/// Both sides send READY eagerly and accept exactly one READY back.
pub struct NullMechanism {
    state: NullState,
    pending_out: Option<Bytes>,
    peer: Metadata,
}

impl NullMechanism {
    pub fn new(local: Metadata) -> Self {
        Self {
            state: NullState::NeedRecvReady,
            pending_out: Some(encode_ready(&local)),
            peer: Metadata::new(),
        }
    }
}

impl Mechanism for NullMechanism {
    fn name(&self) -> &'static str {
        "NULL"
    }

    fn on_inbound(&mut self, command: &ZmtpCommand<'_>) -> Result<(), ZmtpError> {
        reject_on_error(command)?;

        match self.state {
            NullState::NeedRecvReady if command.is(READY) => {
                self.peer = command.properties()?;
                self.state = NullState::Done;
                Ok(())
            }
            NullState::NeedRecvReady => Err(ZmtpError::Protocol("expected READY")),
            NullState::Done => Err(ZmtpError::Protocol("command after READY")),
        }
    }

    fn next_outbound(&mut self) -> Option<Bytes> {
        self.pending_out.take()
    }

    fn is_done(&self) -> bool {
        self.state == NullState::Done && self.pending_out.is_none()
    }

    fn peer_metadata(&self) -> &Metadata {
        &self.peer
    }
}
