//! Pending-handshake table.
//!
//! Connections the relay transport has accepted but that have not yet
//! proven knowledge of the password. An entry either gets promoted to
//! a live peer connection, answers wrong and is closed, or ages out.

use std::time::{Duration, Instant};

use tether_transport::{IdentityToken, RelayConn};

/// One accepted-but-unauthenticated relayed connection.
#[derive(Debug)]
pub struct PendingHandshake {
    /// The parked relayed connection.
    pub conn: RelayConn,
    /// Claimed identity of the remote peer.
    pub remote: IdentityToken,
    /// Whether the password challenge has been sent yet.
    pub greeted: bool,
    created: Instant,
}

impl PendingHandshake {
    fn new(conn: RelayConn, remote: IdentityToken) -> Self {
        Self {
            conn,
            remote,
            greeted: false,
            created: Instant::now(),
        }
    }

    /// How long this entry has been parked.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }
}

/// Table of pending handshakes, aged out by the registry's sweep.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: Vec<PendingHandshake>,
}

impl PendingTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a freshly accepted connection.
    pub fn insert(&mut self, conn: RelayConn, remote: IdentityToken) {
        self.entries.push(PendingHandshake::new(conn, remote));
    }

    /// Remove and return the entry for `conn`, if present.
    pub fn remove(&mut self, conn: RelayConn) -> Option<PendingHandshake> {
        let index = self.entries.iter().position(|entry| entry.conn == conn)?;
        Some(self.entries.remove(index))
    }

    /// Entry for `conn`, if present.
    #[must_use]
    pub fn get_mut(&mut self, conn: RelayConn) -> Option<&mut PendingHandshake> {
        self.entries.iter_mut().find(|entry| entry.conn == conn)
    }

    /// Whether `conn` is parked here.
    #[must_use]
    pub fn contains(&self, conn: RelayConn) -> bool {
        self.entries.iter().any(|entry| entry.conn == conn)
    }

    /// Handles of all parked connections.
    #[must_use]
    pub fn conns(&self) -> Vec<RelayConn> {
        self.entries.iter().map(|entry| entry.conn).collect()
    }

    /// Remove and return every entry, regardless of age.
    pub fn drain(&mut self) -> Vec<PendingHandshake> {
        std::mem::take(&mut self.entries)
    }

    /// Remove every entry older than `timeout` and return them.
    /// Sweeping an empty table is a no-op.
    pub fn sweep_expired(&mut self, timeout: Duration) -> Vec<PendingHandshake> {
        let mut expired = Vec::new();
        let mut index = 0;
        while index < self.entries.len() {
            if self.entries[index].age() > timeout {
                expired.push(self.entries.remove(index));
            } else {
                index += 1;
            }
        }
        expired
    }

    /// Number of parked connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
