//! Configuration surface.
//!
//! Everything here affects diagnostics, timing or capacity, never the
//! correctness of the relay path. Defaults are chosen so a host and a
//! client on one machine work with no configuration at all.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::policy::JoinFilter;

/// Tunnel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Host-side admission filter.
    #[serde(default)]
    pub join_filter: JoinFilter,
    /// Seconds of silence after which a connection (pending or live)
    /// is torn down.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Worker loop frequency, iterations per second.
    #[serde(default = "default_thread_hz")]
    pub thread_hz: u32,
    /// First local UDP port handed to peer connections.
    #[serde(default = "default_port_range_begin")]
    pub port_range_begin: u16,
    /// Last local UDP port handed to peer connections (inclusive).
    #[serde(default = "default_port_range_end")]
    pub port_range_end: u16,
    /// Bind local sockets on 127.0.0.1 only.
    #[serde(default = "default_true")]
    pub force_loopback: bool,
    /// Host-side cap on simultaneous peers (pending included).
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Where a host forwards relayed game data locally (the game
    /// server's UDP address). Clients learn it from traffic instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_addr: Option<SocketAddr>,
    /// Diagnostics-only log toggles.
    #[serde(default)]
    pub debug: DebugLog,
}

/// Independent debug-log toggles. None affect correctness.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DebugLog {
    /// Log local socket creation.
    #[serde(default)]
    pub socket_creation: bool,
    /// Log every forwarded packet. Loud.
    #[serde(default)]
    pub packet_spam: bool,
    /// Log relay connection-status transitions.
    #[serde(default)]
    pub connection_status: bool,
    /// Catch-all trace toggle.
    #[serde(default)]
    pub trace_all: bool,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_thread_hz() -> u32 {
    300
}

fn default_port_range_begin() -> u16 {
    26000
}

fn default_port_range_end() -> u16 {
    26063
}

fn default_true() -> bool {
    true
}

fn default_max_clients() -> usize {
    32
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            join_filter: JoinFilter::default(),
            timeout_secs: default_timeout_secs(),
            thread_hz: default_thread_hz(),
            port_range_begin: default_port_range_begin(),
            port_range_end: default_port_range_end(),
            force_loopback: default_true(),
            max_clients: default_max_clients(),
            game_addr: None,
            debug: DebugLog::default(),
        }
    }
}

impl TunnelConfig {
    /// Idle/handshake timeout as a duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Sleep between worker iterations, derived from `thread_hz`.
    /// Never below one millisecond.
    #[must_use]
    pub fn worker_interval(&self) -> Duration {
        let hz = self.thread_hz.max(1);
        Duration::from_micros(u64::from(1_000_000 / hz).max(1_000))
    }

    /// Local UDP port range, inclusive on both ends.
    #[must_use]
    pub fn port_range(&self) -> RangeInclusive<u16> {
        self.port_range_begin..=self.port_range_end
    }
}
