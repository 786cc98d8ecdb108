//! ZMTP handshake driver.
//!
//! Runs greeting exchange and the security mechanism to completion before the
//! connection is handed to the receive task. Any bytes the peer pipelined
//! after its last handshake command stay buffered in the [`FrameReader`].

use keel_core::metadata::Metadata;
use keel_core::socket_type::SocketType;
use keel_core::transport::TransportWriter;
use tracing::{debug, warn};

use crate::codec::{encode_frame, ZmtpError, FLAG_COMMAND};
use crate::command::ZmtpCommand;
use crate::engine::PeerInfo;
use crate::greeting::ZmtpGreeting;
use crate::mechanism::{Mechanism, SecurityMechanism};
use crate::reader::FrameReader;

const SOCKET_TYPE: &str = "Socket-Type";

/// Perform the complete ZMTP handshake.
///
/// 1. Greeting exchange (version, mechanism, as-server)
/// 2. Mechanism command exchange (READY, or HELLO/WELCOME/INITIATE/READY)
/// 3. Peer `Socket-Type` validation
pub(crate) async fn perform_handshake(
    writer: &mut TransportWriter,
    reader: &mut FrameReader,
    security: &SecurityMechanism,
    socket_type: SocketType,
    as_server: bool,
    extra: Option<&Metadata>,
) -> Result<PeerInfo, ZmtpError> {
    debug!(
        "[HANDSHAKE] Starting {} handshake for {} (as_server={})",
        security.name(),
        socket_type,
        as_server
    );

    let mut mechanism = security.build(as_server, local_properties(socket_type, extra))?;

    // Step 1: greetings
    writer
        .write_all(ZmtpGreeting::new(mechanism.name(), as_server).encode())
        .await?;
    let peer_greeting = ZmtpGreeting::parse(&reader.read_greeting().await?)?;
    debug!(
        "[HANDSHAKE] Peer greeting: ZMTP {}.{} {} as_server={}",
        peer_greeting.major, peer_greeting.minor, peer_greeting.mechanism, peer_greeting.as_server
    );

    if peer_greeting.mechanism != mechanism.name() {
        return Err(ZmtpError::MechanismMismatch {
            local: mechanism.name(),
            peer: peer_greeting.mechanism,
        });
    }
    if security.requires_distinct_roles() && peer_greeting.as_server == as_server {
        return Err(ZmtpError::Protocol("both peers claim the same as-server role"));
    }

    // Step 2: mechanism commands
    drive_mechanism(writer, reader, mechanism.as_mut()).await?;

    // Step 3: peer socket type
    let peer_metadata = mechanism.peer_metadata().clone();
    let raw = peer_metadata
        .get(SOCKET_TYPE)
        .ok_or(ZmtpError::Protocol("peer did not announce Socket-Type"))?;
    let peer_type = SocketType::from_wire(raw)
        .filter(|peer| socket_type.is_compatible(*peer))
        .ok_or_else(|| ZmtpError::IncompatiblePeer {
            local: socket_type,
            peer: String::from_utf8_lossy(raw).into_owned(),
        })?;

    debug!("[HANDSHAKE] Handshake complete! Peer is {}", peer_type);

    Ok(PeerInfo {
        socket_type: peer_type,
        mechanism: mechanism.name(),
        as_server: peer_greeting.as_server,
        metadata: peer_metadata,
    })
}

/// Socket-Type first, then caller properties; callers cannot override it.
fn local_properties(socket_type: SocketType, extra: Option<&Metadata>) -> Metadata {
    let mut props = Metadata::new();
    props.insert(SOCKET_TYPE, socket_type.as_str());
    if let Some(extra) = extra {
        for (name, value) in extra.iter() {
            if !name.eq_ignore_ascii_case(SOCKET_TYPE) {
                props.insert(name, value.clone());
            }
        }
    }
    props
}

async fn drive_mechanism(
    writer: &mut TransportWriter,
    reader: &mut FrameReader,
    mechanism: &mut dyn Mechanism,
) -> Result<(), ZmtpError> {
    loop {
        flush(writer, mechanism).await?;
        if mechanism.is_done() {
            return Ok(());
        }

        let frame = reader.next_frame().await?.ok_or(ZmtpError::Closed)?;
        if !frame.is_command() {
            return Err(ZmtpError::Protocol("data frame during handshake"));
        }
        let command = ZmtpCommand::parse(&frame.payload)?;
        debug!("[HANDSHAKE] Received {} command", command.name_str());

        if let Err(e) = mechanism.on_inbound(&command) {
            warn!("[HANDSHAKE] Mechanism rejected {}: {}", command.name_str(), e);
            // Let the peer see our ERROR before the connection drops
            if let Err(flush_err) = flush(writer, mechanism).await {
                debug!("[HANDSHAKE] Could not deliver ERROR: {}", flush_err);
            }
            return Err(e);
        }
    }
}

async fn flush(writer: &mut TransportWriter, mechanism: &mut dyn Mechanism) -> Result<(), ZmtpError> {
    while let Some(body) = mechanism.next_outbound() {
        writer.write_all(encode_frame(FLAG_COMMAND, &body)).await?;
    }
    Ok(())
}
