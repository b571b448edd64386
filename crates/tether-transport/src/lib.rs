//! # TETHER Transport
//!
//! Transport layer for TETHER.
//!
//! This crate provides:
//! - The relay-transport capability trait consumed by the connection
//!   registry (`relay::RelayTransport`)
//! - An in-memory relay backend for loopback development and tests
//!   (`memory::MemoryRelayHub`)
//! - The local UDP datagram socket the game process talks to
//!   (`udp::LanSocket`)
//!
//! The relay network's wire format and NAT-traversal internals are not
//! implemented here; they belong to whichever backend implements
//! [`relay::RelayTransport`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod relay;
pub mod udp;

pub use memory::{MemoryRelay, MemoryRelayHub};
pub use relay::{
    CloseReason, ConnectionEvent, IdentityToken, ListenHandle, RelayConn, RelayTransport,
    TransportError,
};
pub use udp::LanSocket;

/// Maximum datagram size carried in either direction (64 KiB).
pub const MAX_DATAGRAM_SIZE: usize = 65536;
