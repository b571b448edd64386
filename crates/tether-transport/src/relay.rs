//! Relay-transport capability trait and connection-status events.
//!
//! The relay network provides NAT-traversing, connection-oriented
//! delivery between two identities without direct IP exchange. The
//! connection registry consumes this capability through a trait so the
//! production backend and the in-memory test backend are
//! interchangeable.

use std::fmt;
use std::io;

/// Opaque identity of a peer on the relay network.
///
/// How the token is minted (account id, fingerprint, ...) is the relay
/// backend's business; the core only compares and forwards it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityToken(String);

impl IdentityToken {
    /// Create a token from its string form.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token's string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityToken {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Handle to one relayed connection (a virtual circuit to a remote
/// identity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelayConn(pub u64);

impl fmt::Display for RelayConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Handle to a listening relay endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenHandle(pub u64);

/// Application close reasons carried on the relay's close path.
///
/// The numeric values are part of the compatibility surface and must
/// not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CloseReason {
    /// Host is not accepting connections.
    NotOpen = 1001,
    /// Host is at capacity.
    ServerFull = 1002,
    /// The closing side could not operate its local socket.
    RemoteIssue = 1003,
    /// Ordinary teardown by the closing side.
    ClosedByPeer = 1004,
    /// Friends-only admission rejected a non-friend.
    NotFriend = 1005,
    /// Password handshake failed or timed out.
    BadPassword = 1006,
}

impl CloseReason {
    /// Numeric wire code for this reason.
    #[must_use]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Decode a wire code, if it names a known reason.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1001 => Some(Self::NotOpen),
            1002 => Some(Self::ServerFull),
            1003 => Some(Self::RemoteIssue),
            1004 => Some(Self::ClosedByPeer),
            1005 => Some(Self::NotFriend),
            1006 => Some(Self::BadPassword),
            _ => None,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotOpen => "not open",
            Self::ServerFull => "server full",
            Self::RemoteIssue => "remote issue",
            Self::ClosedByPeer => "closed by peer",
            Self::NotFriend => "not a friend",
            Self::BadPassword => "bad password",
        };
        write!(f, "{name} ({})", self.code())
    }
}

/// Connection-status transitions reported by [`RelayTransport::poll_events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A remote identity is attempting to connect to our listening
    /// endpoint. Must be answered with `accept` or `close`.
    Connecting {
        /// Handle for the attempted connection.
        conn: RelayConn,
        /// Claimed identity of the remote peer.
        remote: IdentityToken,
    },
    /// A connection (inbound or outbound) finished establishing and
    /// can carry messages.
    Connected {
        /// Handle for the established connection.
        conn: RelayConn,
        /// Identity of the remote peer.
        remote: IdentityToken,
    },
    /// A connection ended. Carries the reason supplied by whichever
    /// side closed it.
    Closed {
        /// Handle for the closed connection.
        conn: RelayConn,
        /// Close reason supplied by the closing side.
        reason: CloseReason,
    },
}

/// Transport layer errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from an underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The relay network is not ready to carry traffic.
    #[error("relay network unavailable")]
    Unavailable,

    /// No peer with the given identity is reachable on the relay.
    #[error("unknown peer identity: {0}")]
    UnknownPeer(IdentityToken),

    /// The target peer exists but is not accepting connections.
    #[error("peer is not listening")]
    NotListening,

    /// The connection handle no longer names a live connection.
    #[error("relayed connection closed")]
    ConnectionClosed,

    /// The endpoint already holds a listening handle.
    #[error("already listening")]
    AlreadyListening,
}

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// NAT-traversing, connection-oriented relay capability.
///
/// All operations are non-blocking; connection-status transitions are
/// delivered through [`poll_events`](Self::poll_events), consumed once
/// per registry tick. Implementations must be safe to share between
/// the registry thread and the per-peer workers.
pub trait RelayTransport: Send + Sync {
    /// Open a listening endpoint so remote identities can connect.
    ///
    /// # Errors
    /// Fails if the relay network is unavailable or a listener is
    /// already open.
    fn listen(&self) -> TransportResult<ListenHandle>;

    /// Close a listening endpoint. Existing connections are unaffected.
    fn close_listener(&self, listener: ListenHandle);

    /// Begin an outbound connection to a remote identity.
    ///
    /// The returned handle is not usable for traffic until a
    /// [`ConnectionEvent::Connected`] arrives for it; failure is
    /// reported as [`ConnectionEvent::Closed`].
    ///
    /// # Errors
    /// Fails if the identity is not reachable on the relay at all.
    fn connect(&self, remote: &IdentityToken) -> TransportResult<RelayConn>;

    /// Accept an inbound connection previously reported as
    /// [`ConnectionEvent::Connecting`].
    ///
    /// # Errors
    /// Fails if the handle no longer names a live attempt.
    fn accept(&self, conn: RelayConn) -> TransportResult<()>;

    /// Send one message over an established connection.
    ///
    /// # Errors
    /// Fails if the connection is gone; per-connection failures never
    /// affect other connections.
    fn send(&self, conn: RelayConn, payload: &[u8]) -> TransportResult<()>;

    /// Receive the next available message on a connection, if any.
    ///
    /// Returns `Ok(None)` when no message is waiting.
    ///
    /// # Errors
    /// Fails with [`TransportError::ConnectionClosed`] once the
    /// connection is gone and its queue is drained.
    fn recv(&self, conn: RelayConn) -> TransportResult<Option<Vec<u8>>>;

    /// Drain all connection-status events that occurred since the last
    /// poll. Never blocks.
    fn poll_events(&self) -> Vec<ConnectionEvent>;

    /// Close a connection, reporting `reason` to the remote side.
    /// Closing an already-closed connection is a no-op.
    fn close(&self, conn: RelayConn, reason: CloseReason);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_codes_are_stable() {
        assert_eq!(CloseReason::NotOpen.code(), 1001);
        assert_eq!(CloseReason::ServerFull.code(), 1002);
        assert_eq!(CloseReason::RemoteIssue.code(), 1003);
        assert_eq!(CloseReason::ClosedByPeer.code(), 1004);
        assert_eq!(CloseReason::NotFriend.code(), 1005);
        assert_eq!(CloseReason::BadPassword.code(), 1006);
    }

    #[test]
    fn test_close_reason_roundtrip() {
        for reason in [
            CloseReason::NotOpen,
            CloseReason::ServerFull,
            CloseReason::RemoteIssue,
            CloseReason::ClosedByPeer,
            CloseReason::NotFriend,
            CloseReason::BadPassword,
        ] {
            assert_eq!(CloseReason::from_code(reason.code()), Some(reason));
        }
        assert_eq!(CloseReason::from_code(0), None);
        assert_eq!(CloseReason::from_code(1007), None);
    }

    #[test]
    fn test_identity_token_display() {
        let token = IdentityToken::new("alice");
        assert_eq!(token.to_string(), "alice");
        assert_eq!(token.as_str(), "alice");
    }
}
