//! # TETHER Discovery
//!
//! How a client learns which identity to connect to, and how a host
//! decides who counts as a friend.
//!
//! This crate provides:
//! - The identity/friends capability consumed by the connection
//!   registry (`identity::IdentityProvider`)
//! - The shareable connect command: format and launch-command parsing
//!   (`connect_string`)
//! - Pluggable discovery strategies: direct connect-string and
//!   shared-lobby membership (`lobby`)
//!
//! Discovery only ever produces an identity token for the registry's
//! outbound connect; it never touches the relay or handshake logic.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connect_string;
pub mod identity;
pub mod lobby;

pub use connect_string::{ConnectRequest, format_connect_command, parse_join_request};
pub use identity::{IdentityProvider, StaticRoster};
pub use lobby::{
    DirectConnect, DiscoveryError, DiscoveryStrategy, LobbyDirectory, LobbyDiscovery, LobbyId,
    MemoryLobbies,
};
