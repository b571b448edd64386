//! # TETHER Core
//!
//! Connection lifecycle management for TETHER.
//!
//! This crate provides:
//! - The connection registry: role state machine, admission policy,
//!   password handshake, sweeps (`registry`)
//! - The per-peer relay worker pumping datagrams between a local UDP
//!   socket and a relayed connection (`peer`)
//! - Join policy, password store, pending-handshake table
//!   (`policy`, `password`, `pending`)
//! - Control-channel tokens and byte-order helpers (`wire`)
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     ConnectionRegistry                        │
//! │   (update thread: events, admission, handshake, sweeps)      │
//! ├──────────────┬───────────────┬───────────────────────────────┤
//! │ PeerConnection│ PeerConnection│  ...one worker thread each    │
//! │ relay ⇄ UDP   │ relay ⇄ UDP  │  (verbatim, both directions)  │
//! └──────────────┴───────────────┴───────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod password;
pub mod peer;
pub mod pending;
pub mod policy;
pub mod registry;
pub mod wire;

pub use config::{DebugLog, TunnelConfig};
pub use error::SetupError;
pub use password::Password;
pub use peer::PeerConnection;
pub use pending::{PendingHandshake, PendingTable};
pub use policy::{Admission, JoinFilter};
pub use registry::{CommandStatus, ConnectionRegistry, Role};

/// Release version, YYYY-MM-DD-(a-z) when there are several in a day.
pub const VERSION: &str = "2026-07-18-a";

/// Hard cap on packets pumped per direction per worker iteration.
pub const MAX_PACKETS_PER_TICK: usize = 16;
