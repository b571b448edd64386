//! Connection registry.
//!
//! The single orchestrator for the whole subsystem: it owns the role
//! state, the listening endpoint, the pending-handshake table and the
//! collection of live peer workers. `tick` runs once per frame on the
//! owning process's update thread and consumes the relay transport's
//! event queue; nothing here is ever called concurrently with itself.

use std::sync::Arc;
use std::fmt;
use tracing::{debug, info, warn};

use tether_discovery::{IdentityProvider, format_connect_command};
use tether_transport::{
    CloseReason, ConnectionEvent, IdentityToken, LanSocket, ListenHandle, RelayConn,
    RelayTransport,
};

use crate::config::TunnelConfig;
use crate::error::SetupError;
use crate::password::Password;
use crate::peer::{PeerConnection, PeerSetup};
use crate::pending::PendingTable;
use crate::policy::{self, Admission, JoinFilter};
use crate::wire;

/// Process-wide connection role. Exactly one value at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Relay transport not ready yet.
    Unavailable,
    /// Ready, neither hosting nor joined.
    NotConnected,
    /// Listening endpoint open, accepting inbound peers.
    Host,
    /// One outbound relayed connection to a host.
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unavailable => "unavailable",
            Self::NotConnected => "not connected",
            Self::Host => "hosting",
            Self::Client => "client",
        };
        f.write_str(name)
    }
}

/// Outcome of [`ConnectionRegistry::connect_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// A shareable command was produced.
    Ok,
    /// Not hosting, nothing to share.
    NotHosting,
    /// Friends-only filter: inviting beats a pasteable command.
    UseInviteInstead,
}

struct OutboundAttempt {
    conn: RelayConn,
    password: Option<String>,
}

/// Connection lifecycle manager.
pub struct ConnectionRegistry {
    config: TunnelConfig,
    relay: Arc<dyn RelayTransport>,
    roster: Arc<dyn IdentityProvider>,
    role: Role,
    listener: Option<ListenHandle>,
    password: Password,
    pending: PendingTable,
    peers: Vec<PeerConnection>,
    outbound: Option<OutboundAttempt>,
}

impl ConnectionRegistry {
    /// Create a registry over the given relay transport and identity
    /// provider. Starts [`Role::Unavailable`]; the first `tick`
    /// transitions to [`Role::NotConnected`] once the transport is up.
    pub fn new(
        config: TunnelConfig,
        relay: Arc<dyn RelayTransport>,
        roster: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            config,
            relay,
            roster,
            role: Role::Unavailable,
            listener: None,
            password: Password::generate(),
            pending: PendingTable::new(),
            peers: Vec::new(),
            outbound: None,
        }
    }

    /// Current role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current admission filter.
    #[must_use]
    pub fn join_filter(&self) -> JoinFilter {
        self.config.join_filter
    }

    /// Change the admission filter; applies to the next inbound
    /// attempt.
    pub fn set_join_filter(&mut self, filter: JoinFilter) {
        self.config.join_filter = filter;
    }

    /// Current shared secret.
    #[must_use]
    pub fn password(&self) -> &Password {
        &self.password
    }

    /// Live peer workers, for inspection.
    #[must_use]
    pub fn peers(&self) -> &[PeerConnection] {
        &self.peers
    }

    /// Number of connections parked awaiting the password.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Open the listening relay endpoint and become the host.
    /// Regenerates the password.
    ///
    /// # Errors
    /// `SetupError::InvalidRole` outside [`Role::NotConnected`];
    /// `SetupError::Relay` if the transport cannot listen (fatal to
    /// the subsystem).
    pub fn open_endpoint(&mut self) -> Result<(), SetupError> {
        if self.role != Role::NotConnected {
            return Err(SetupError::InvalidRole(self.role));
        }
        self.listener = Some(self.relay.listen()?);
        self.password.rotate();
        self.role = Role::Host;
        info!(filter = %self.config.join_filter, "listening for relayed connections");
        Ok(())
    }

    /// Tear down the listening endpoint. Existing peer connections
    /// keep running.
    pub fn close_endpoint(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.relay.close_listener(listener);
            debug!("listening endpoint closed");
        }
        if self.role == Role::Host {
            self.role = Role::NotConnected;
        }
    }

    /// Flag every peer worker for deletion; with `wait`, block until
    /// every worker thread has exited. Idempotent.
    pub fn close_all(&mut self, wait: bool) {
        for entry in self.pending.drain() {
            self.relay.close(entry.conn, CloseReason::ClosedByPeer);
        }
        if let Some(attempt) = self.outbound.take() {
            self.relay.close(attempt.conn, CloseReason::ClosedByPeer);
        }
        for peer in &self.peers {
            peer.request_deletion();
        }
        if wait {
            // Dropping a PeerConnection joins its worker thread.
            self.peers.clear();
            if self.role == Role::Client {
                self.role = Role::NotConnected;
            }
        }
    }

    /// Explicit role mutator, keeping the role/endpoint invariant.
    ///
    /// # Errors
    /// [`Role::Client`] cannot be entered here (use
    /// [`request_connect`](Self::request_connect)); becoming the host
    /// can fail with the same errors as
    /// [`open_endpoint`](Self::open_endpoint).
    pub fn set_role(&mut self, role: Role) -> Result<(), SetupError> {
        match role {
            Role::Host => {
                if self.role != Role::Host {
                    self.open_endpoint()?;
                }
                Ok(())
            }
            Role::NotConnected => {
                self.close_endpoint();
                Ok(())
            }
            Role::Unavailable => {
                self.close_endpoint();
                self.close_all(true);
                self.role = Role::Unavailable;
                Ok(())
            }
            Role::Client => Err(SetupError::InvalidRole(self.role)),
        }
    }

    /// Throw away the current password and pick a fresh one.
    pub fn rerandomize_password(&mut self) {
        self.password.rotate();
        debug!("password rerandomized");
    }

    /// Shareable connect command for the current endpoint.
    #[must_use]
    pub fn connect_command(&self) -> (CommandStatus, Option<String>) {
        if self.role != Role::Host {
            return (CommandStatus::NotHosting, None);
        }
        match self.config.join_filter {
            JoinFilter::Friends => (CommandStatus::UseInviteInstead, None),
            JoinFilter::Controlled => (
                CommandStatus::Ok,
                Some(format_connect_command(
                    &self.roster.local_identity(),
                    Some(self.password.as_str()),
                )),
            ),
            JoinFilter::Off | JoinFilter::Everyone => (
                CommandStatus::Ok,
                Some(format_connect_command(&self.roster.local_identity(), None)),
            ),
        }
    }

    /// Start the single outbound connection to a host. The password,
    /// if any, is presented inline over the control channel once the
    /// host challenges.
    ///
    /// # Errors
    /// `SetupError::InvalidRole` outside [`Role::NotConnected`];
    /// `SetupError::Relay` if the identity is unreachable.
    pub fn request_connect(
        &mut self,
        remote: &IdentityToken,
        password: Option<&str>,
    ) -> Result<RelayConn, SetupError> {
        if self.role != Role::NotConnected {
            return Err(SetupError::InvalidRole(self.role));
        }
        let conn = self.relay.connect(remote)?;
        info!(%remote, "connecting");
        self.outbound = Some(OutboundAttempt {
            conn,
            password: password.map(str::to_string),
        });
        self.role = Role::Client;
        Ok(conn)
    }

    /// Drive the subsystem: consume connection-status events, pump
    /// pending handshakes, sweep timed-out pending entries and retired
    /// workers. Called once per frame by the owning thread.
    pub fn tick(&mut self) {
        if self.role == Role::Unavailable {
            // The transport handed to us is constructed and usable.
            self.role = Role::NotConnected;
            debug!("relay network ready");
        }

        for event in self.relay.poll_events() {
            if self.config.debug.connection_status {
                debug!(?event, "connection status changed");
            }
            match event {
                ConnectionEvent::Connecting { conn, remote } => {
                    self.handle_connecting(conn, &remote);
                }
                ConnectionEvent::Connected { conn, remote } => {
                    self.handle_connected(conn, remote);
                }
                ConnectionEvent::Closed { conn, reason } => {
                    self.handle_closed(conn, reason);
                }
            }
        }

        self.pump_pending();
        self.sweep_pending();
        self.sweep_peers();

        if self.role == Role::Client && self.outbound.is_none() && self.peers.is_empty() {
            debug!("all connections closed");
            self.role = Role::NotConnected;
        }
    }

    /// Admission decision for one inbound attempt.
    fn handle_connecting(&mut self, conn: RelayConn, remote: &IdentityToken) {
        if self.role != Role::Host || self.listener.is_none() {
            self.relay.close(conn, CloseReason::NotOpen);
            return;
        }
        if self.peers.len() + self.pending.len() >= self.config.max_clients {
            info!(%remote, "rejecting connection: server full");
            self.relay.close(conn, CloseReason::ServerFull);
            return;
        }
        match policy::evaluate(self.config.join_filter, self.roster.is_friend(remote)) {
            Admission::Reject(reason) => {
                info!(%remote, %reason, "rejecting connection");
                self.relay.close(conn, reason);
            }
            Admission::Accept => {
                if self.relay.accept(conn).is_err() {
                    warn!(%remote, "inbound connection vanished before accept");
                }
                // Promotion happens on the Connected event.
            }
            Admission::Challenge => {
                if self.relay.accept(conn).is_err() {
                    warn!(%remote, "inbound connection vanished before accept");
                    return;
                }
                self.pending.insert(conn, remote.clone());
                debug!(%remote, %conn, "connection parked awaiting password");
            }
        }
    }

    fn handle_connected(&mut self, conn: RelayConn, remote: IdentityToken) {
        if let Some(attempt) = self.outbound.take_if(|attempt| attempt.conn == conn) {
            info!(%remote, "connected to host");
            self.spawn_peer(conn, remote, None, attempt.password);
            return;
        }

        if self.pending.contains(conn) {
            let already_greeted = self
                .pending
                .get_mut(conn)
                .map(|entry| std::mem::replace(&mut entry.greeted, true))
                .unwrap_or(true);
            if !already_greeted && self.relay.send(conn, wire::NEEDPASS).is_err() {
                self.pending.remove(conn);
            }
            return;
        }

        if self.role == Role::Host {
            self.spawn_peer(conn, remote, self.config.game_addr, None);
        } else {
            // Connected for something we no longer track.
            self.relay.close(conn, CloseReason::NotOpen);
        }
    }

    fn handle_closed(&mut self, conn: RelayConn, reason: CloseReason) {
        if self.pending.remove(conn).is_some() {
            debug!(%conn, %reason, "pending connection went away");
            return;
        }
        if self.outbound.take_if(|attempt| attempt.conn == conn).is_some() {
            warn!(%reason, "outbound connection attempt failed");
            self.role = Role::NotConnected;
            return;
        }
        if let Some(peer) = self.peers.iter().find(|peer| peer.conn() == conn) {
            // Ordinary remote teardown; the worker notices on its own,
            // this just reaps it a tick sooner.
            debug!(%conn, %reason, "relayed connection closed");
            peer.request_deletion();
        }
    }

    /// Check parked connections for the `"OK"` + password reply.
    fn pump_pending(&mut self) {
        for conn in self.pending.conns() {
            loop {
                match self.relay.recv(conn) {
                    Ok(Some(message)) => {
                        let accepted = wire::parse_password_reply(&message)
                            .is_some_and(|supplied| self.password.matches(supplied));
                        if accepted {
                            if let Some(entry) = self.pending.remove(conn) {
                                debug!(remote = %entry.remote, "password accepted");
                                self.spawn_peer(conn, entry.remote, self.config.game_addr, None);
                            }
                        } else {
                            info!(%conn, "bad password");
                            self.pending.remove(conn);
                            self.relay.close(conn, CloseReason::BadPassword);
                        }
                        break;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        self.pending.remove(conn);
                        break;
                    }
                }
            }
        }
    }

    fn sweep_pending(&mut self) {
        for entry in self.pending.sweep_expired(self.config.timeout()) {
            info!(remote = %entry.remote, "password handshake timed out");
            self.relay.close(entry.conn, CloseReason::BadPassword);
        }
    }

    /// Reap workers that finished or were flagged; dropping the handle
    /// joins the thread.
    fn sweep_peers(&mut self) {
        let mut index = 0;
        while index < self.peers.len() {
            let reap =
                self.peers[index].is_finished() || self.peers[index].deletion_requested();
            if reap {
                let peer = self.peers.remove(index);
                debug!(remote = %peer.remote(), port = peer.port(), "reaping peer worker");
            } else {
                index += 1;
            }
        }
    }

    /// Bind a local port and start a worker for an established
    /// relayed connection. `password` is only set client-side, for
    /// answering the host's challenge.
    fn spawn_peer(
        &mut self,
        conn: RelayConn,
        remote: IdentityToken,
        send_back: Option<std::net::SocketAddr>,
        password: Option<String>,
    ) {
        let in_use: Vec<u16> = self.peers.iter().map(PeerConnection::port).collect();
        let socket = match LanSocket::bind_in_range(
            self.config.port_range(),
            &in_use,
            self.config.force_loopback,
        ) {
            Ok(socket) => socket,
            Err(e) => {
                warn!(%remote, error = %e, "could not open a local socket for peer");
                self.relay.close(conn, CloseReason::RemoteIssue);
                return;
            }
        };
        if self.config.debug.socket_creation {
            debug!(%remote, port = socket.port(), "created local socket for peer");
        }

        let game_ready = password.is_none();
        let setup = PeerSetup {
            relay: Arc::clone(&self.relay),
            conn,
            remote: remote.clone(),
            socket,
            send_back,
            game_ready,
            password: password.map(String::into_bytes),
            interval: self.config.worker_interval(),
            timeout: self.config.timeout(),
            debug: self.config.debug,
        };
        match PeerConnection::spawn(setup) {
            Ok(peer) => {
                info!(%remote, port = peer.port(), "relaying for peer");
                self.peers.push(peer);
            }
            Err(e) => {
                warn!(%remote, error = %e, "could not spawn peer worker");
                self.relay.close(conn, CloseReason::RemoteIssue);
            }
        }
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.close_all(true);
        self.close_endpoint();
    }
}
