//! PLAIN authentication mechanism (RFC 24)
//!
//! PLAIN provides simple username/password authentication.
//!
//! ## Security Warning
//!
//! PLAIN sends credentials in cleartext! Only use over loopback, an
//! encrypted tunnel, or a trusted network.
//!
//! ## Protocol Flow
//!
//! ```text
//! C: HELLO    [u8 len][username][u8 len][password]
//! S: WELCOME  (or ERROR [u8 len][reason])
//! C: INITIATE [properties]
//! S: READY    [properties]
//! ```

use crate::codec::ZmtpError;
use crate::command::{
    encode_command, encode_error, encode_initiate, encode_ready, ZmtpCommand, HELLO, INITIATE,
    READY, WELCOME,
};
use crate::mechanism::{reject_on_error, Mechanism};
use bytes::Bytes;
use hashbrown::HashMap;
use keel_core::metadata::Metadata;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// PLAIN client credentials
#[derive(Clone)]
pub struct PlainCredentials {
    pub username: String,
    pub password: String,
}

impl PlainCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for PlainCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlainCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Server-side credential check.
///
/// Validates against a static map of username → password, or accepts any
/// HELLO when built with [`PlainAuthenticator::accept_all`].
#[derive(Debug, Clone, Default)]
pub struct PlainAuthenticator {
    credentials: Option<HashMap<String, String>>,
}

impl PlainAuthenticator {
    /// Empty credential table: every HELLO is rejected until users are added.
    pub fn new() -> Self {
        Self {
            credentials: Some(HashMap::new()),
        }
    }

    /// Accept any username/password pair.
    pub fn accept_all() -> Self {
        Self { credentials: None }
    }

    pub fn add_user(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.credentials
            .get_or_insert_with(HashMap::new)
            .insert(username.into(), password.into());
    }

    #[must_use]
    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.add_user(username, password);
        self
    }

    /// Check one credential pair, returning the rejection reason on failure.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<(), String> {
        let Some(credentials) = &self.credentials else {
            return Ok(());
        };
        match credentials.get(username) {
            Some(expected) if expected == password => Ok(()),
            Some(_) => Err("Invalid password".to_string()),
            None => Err("Unknown user".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    AwaitWelcome,
    AwaitReady,
    Done,
}

/// PLAIN client: HELLO → WELCOME → INITIATE → READY.
pub struct PlainClientMechanism {
    state: ClientState,
    local: Metadata,
    outbound: VecDeque<Bytes>,
    peer: Metadata,
}

impl PlainClientMechanism {
    pub fn new(credentials: PlainCredentials, local: Metadata) -> Self {
        debug!(
            "[PLAIN CLIENT] Starting PLAIN authentication for user: {}",
            credentials.username
        );
        let mut outbound = VecDeque::with_capacity(2);
        outbound.push_back(encode_hello(&credentials));
        Self {
            state: ClientState::AwaitWelcome,
            local,
            outbound,
            peer: Metadata::new(),
        }
    }
}

impl Mechanism for PlainClientMechanism {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn on_inbound(&mut self, command: &ZmtpCommand<'_>) -> Result<(), ZmtpError> {
        if let Err(e) = reject_on_error(command) {
            warn!("[PLAIN CLIENT] Authentication failed: {}", e);
            return Err(e);
        }

        match self.state {
            ClientState::AwaitWelcome if command.is(WELCOME) => {
                self.outbound.push_back(encode_initiate(&self.local));
                self.state = ClientState::AwaitReady;
                Ok(())
            }
            ClientState::AwaitReady if command.is(READY) => {
                self.peer = command.properties()?;
                self.state = ClientState::Done;
                debug!("[PLAIN CLIENT] Authentication successful");
                Ok(())
            }
            ClientState::AwaitWelcome => Err(ZmtpError::Protocol("expected WELCOME")),
            ClientState::AwaitReady => Err(ZmtpError::Protocol("expected READY")),
            ClientState::Done => Err(ZmtpError::Protocol("command after READY")),
        }
    }

    fn next_outbound(&mut self) -> Option<Bytes> {
        self.outbound.pop_front()
    }

    fn is_done(&self) -> bool {
        self.state == ClientState::Done && self.outbound.is_empty()
    }

    fn peer_metadata(&self) -> &Metadata {
        &self.peer
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    AwaitHello,
    AwaitInitiate,
    Done,
}

/// PLAIN server: validates HELLO, then answers INITIATE with READY.
pub struct PlainServerMechanism {
    state: ServerState,
    authenticator: PlainAuthenticator,
    local: Metadata,
    outbound: VecDeque<Bytes>,
    peer: Metadata,
    user_id: Option<String>,
}

impl PlainServerMechanism {
    pub fn new(authenticator: PlainAuthenticator, local: Metadata) -> Self {
        Self {
            state: ServerState::AwaitHello,
            authenticator,
            local,
            outbound: VecDeque::with_capacity(2),
            peer: Metadata::new(),
            user_id: None,
        }
    }

    /// Username accepted in HELLO.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    fn on_hello(&mut self, body: &[u8]) -> Result<(), ZmtpError> {
        let (username, password) = decode_hello(body)?;
        debug!("[PLAIN SERVER] Received credentials for user: {}", username);

        match self.authenticator.authenticate(&username, &password) {
            Ok(()) => {
                self.outbound.push_back(encode_command(WELCOME, &[]));
                self.user_id = Some(username);
                self.state = ServerState::AwaitInitiate;
                Ok(())
            }
            Err(reason) => {
                warn!("[PLAIN SERVER] Authentication failed: {}", reason);
                self.outbound.push_back(encode_error(&reason));
                Err(ZmtpError::AuthenticationFailed(reason))
            }
        }
    }
}

impl Mechanism for PlainServerMechanism {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn on_inbound(&mut self, command: &ZmtpCommand<'_>) -> Result<(), ZmtpError> {
        reject_on_error(command)?;

        match self.state {
            ServerState::AwaitHello if command.is(HELLO) => self.on_hello(command.body),
            ServerState::AwaitInitiate if command.is(INITIATE) => {
                self.peer = command.properties()?;
                self.outbound.push_back(encode_ready(&self.local));
                self.state = ServerState::Done;
                Ok(())
            }
            ServerState::AwaitHello => Err(ZmtpError::Protocol("expected HELLO")),
            ServerState::AwaitInitiate => Err(ZmtpError::Protocol("expected INITIATE")),
            ServerState::Done => Err(ZmtpError::Protocol("command after READY")),
        }
    }

    fn next_outbound(&mut self) -> Option<Bytes> {
        self.outbound.pop_front()
    }

    fn is_done(&self) -> bool {
        self.state == ServerState::Done && self.outbound.is_empty()
    }

    fn peer_metadata(&self) -> &Metadata {
        &self.peer
    }
}

/// Usernames and passwords longer than 255 bytes are truncated on the wire.
fn encode_hello(credentials: &PlainCredentials) -> Bytes {
    let user = credentials.username.as_bytes();
    let pass = credentials.password.as_bytes();
    let user = &user[..user.len().min(255)];
    let pass = &pass[..pass.len().min(255)];

    let mut body = Vec::with_capacity(2 + user.len() + pass.len());
    body.push(user.len() as u8);
    body.extend_from_slice(user);
    body.push(pass.len() as u8);
    body.extend_from_slice(pass);
    encode_command(HELLO, &body)
}

fn decode_hello(body: &[u8]) -> Result<(String, String), ZmtpError> {
    fn field(src: &[u8]) -> Result<(String, &[u8]), ZmtpError> {
        let (&len, rest) = src
            .split_first()
            .ok_or(ZmtpError::Protocol("truncated HELLO"))?;
        let len = len as usize;
        if rest.len() < len {
            return Err(ZmtpError::Protocol("truncated HELLO"));
        }
        let value = std::str::from_utf8(&rest[..len])
            .map_err(|_| ZmtpError::Protocol("HELLO field is not UTF-8"))?;
        Ok((value.to_string(), &rest[len..]))
    }

    let (username, rest) = field(body)?;
    let (password, _) = field(rest)?;
    Ok((username, password))
}
