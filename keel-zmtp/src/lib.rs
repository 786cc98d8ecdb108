//! # Keel ZMTP
//!
//! ZMTP 3.1 protocol engine for Keel's CLIENT/SERVER sockets.
//!
//! ## Overview
//!
//! - **Framing**: short/long frames, COMMAND and MORE flags
//! - **Greeting**: 64-byte version and mechanism negotiation
//! - **Mechanisms**: NULL and PLAIN, as sans-IO state machines
//! - **Engine**: [`ZmtpEngine`] runs the handshake on a transport and then
//!   feeds inbound frames into a channel from a background task
//!
//! ## Example
//!
//! ```rust,no_run
//! use keel_core::endpoint::Endpoint;
//! use keel_core::options::SocketOptions;
//! use keel_core::socket_type::SocketType;
//! use keel_core::transport::Transport;
//! use keel_zmtp::{ProtocolEngine, SecurityMechanism, ZmtpEngine};
//!
//! #[compio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint = Endpoint::parse("tcp://127.0.0.1:5555")?;
//!     let transport = Transport::dial(&endpoint).await?;
//!
//!     let mut engine = ZmtpEngine::new(transport, &SocketOptions::default());
//!     let peer = engine
//!         .prepare(&SecurityMechanism::Null, SocketType::Client, false, None)
//!         .await?;
//!     println!("connected to a {} peer", peer.socket_type);
//!
//!     engine.send_frame("hello".into()).await?;
//!     Ok(())
//! }
//! ```

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod codec;
pub mod command;
pub mod engine;
pub mod greeting;
mod handshake;
pub mod mechanism;
pub mod message;
mod reader;

pub use codec::ZmtpError;
pub use engine::{PeerInfo, ProtocolEngine, ZmtpEngine};
pub use mechanism::plain::{PlainAuthenticator, PlainCredentials};
pub use mechanism::SecurityMechanism;
pub use message::{Message, MessageKind};
