//! Per-peer relay worker.
//!
//! One dedicated thread per authenticated peer, pumping datagrams
//! verbatim between the peer's relayed connection and a private local
//! UDP socket. The worker owns both endpoints; the registry only ever
//! reads the atomic status fields and sets the deletion flag. Workers
//! never touch each other or the registry's collections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use tether_transport::{CloseReason, IdentityToken, LanSocket, RelayConn, RelayTransport};

use crate::MAX_PACKETS_PER_TICK;
use crate::config::DebugLog;
use crate::wire;

/// Everything needed to start a worker.
pub struct PeerSetup {
    /// Shared relay transport.
    pub relay: Arc<dyn RelayTransport>,
    /// Established relayed connection to pump.
    pub conn: RelayConn,
    /// Remote peer's identity, for logs and bookkeeping.
    pub remote: IdentityToken,
    /// Pre-bound local socket the game talks to.
    pub socket: LanSocket,
    /// Where relayed data is delivered locally. A host passes the game
    /// server's address; a client learns it from the first local
    /// datagram.
    pub send_back: Option<SocketAddr>,
    /// Whether game data may flow immediately (false until any
    /// required password exchange is done).
    pub game_ready: bool,
    /// Password to present if the host challenges us.
    pub password: Option<Vec<u8>>,
    /// Sleep between pump iterations.
    pub interval: Duration,
    /// Silence after which the worker retires itself.
    pub timeout: Duration,
    /// Diagnostics toggles.
    pub debug: DebugLog,
}

/// Status fields shared between a worker and the registry.
///
/// Lifecycle flags use acquire/release ordering; the activity stamp is
/// a relaxed single-word counter. The registry polls these once per
/// tick, so one tick of staleness is inherent and fine.
struct PeerShared {
    deletion_requested: AtomicBool,
    finished: AtomicBool,
    game_ready: AtomicBool,
    last_activity_ms: AtomicU64,
}

/// Handle to one live peer worker, owned by the registry.
pub struct PeerConnection {
    conn: RelayConn,
    remote: IdentityToken,
    port: u16,
    started: Instant,
    shared: Arc<PeerShared>,
    handle: Option<JoinHandle<()>>,
}

impl PeerConnection {
    /// Spawn the worker thread for an established relayed connection.
    ///
    /// # Errors
    /// Fails only if the OS refuses to spawn the thread.
    pub fn spawn(setup: PeerSetup) -> std::io::Result<Self> {
        let conn = setup.conn;
        let remote = setup.remote.clone();
        let port = setup.socket.port();
        let started = Instant::now();
        let shared = Arc::new(PeerShared {
            deletion_requested: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            game_ready: AtomicBool::new(setup.game_ready),
            last_activity_ms: AtomicU64::new(0),
        });

        let worker = Worker {
            relay: setup.relay,
            conn,
            socket: setup.socket,
            send_back: setup.send_back,
            password: setup.password,
            interval: setup.interval,
            timeout: setup.timeout,
            debug: setup.debug,
            shared: Arc::clone(&shared),
            started,
        };

        let handle = thread::Builder::new()
            .name(format!("tether-peer-{port}"))
            .spawn(move || worker.run())?;

        Ok(Self {
            conn,
            remote,
            port,
            started,
            shared,
            handle: Some(handle),
        })
    }

    /// The relayed connection this worker pumps.
    #[must_use]
    pub fn conn(&self) -> RelayConn {
        self.conn
    }

    /// Remote peer's identity.
    #[must_use]
    pub fn remote(&self) -> &IdentityToken {
        &self.remote
    }

    /// Local UDP port the game talks to for this peer.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// When the worker was spawned.
    #[must_use]
    pub fn started(&self) -> Instant {
        self.started
    }

    /// Whether game data is flowing (password exchange done).
    #[must_use]
    pub fn game_ready(&self) -> bool {
        self.shared.game_ready.load(Ordering::Acquire)
    }

    /// Time since the last real data packet in either direction.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.shared.last_activity_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }

    /// Whether deletion has been requested (by the registry or by the
    /// worker itself).
    #[must_use]
    pub fn deletion_requested(&self) -> bool {
        self.shared.deletion_requested.load(Ordering::Acquire)
    }

    /// Whether the worker thread has exited its pump loop.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    /// Ask the worker to stop. The only cross-thread call into a
    /// worker; observed cooperatively once per loop iteration.
    pub fn request_deletion(&self) {
        self.shared.deletion_requested.store(true, Ordering::Release);
    }
}

// Dropping the handle requests deletion and joins the thread, so a
// reaped or discarded PeerConnection can never leak its worker.
impl Drop for PeerConnection {
    fn drop(&mut self) {
        self.request_deletion();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct Worker {
    relay: Arc<dyn RelayTransport>,
    conn: RelayConn,
    socket: LanSocket,
    send_back: Option<SocketAddr>,
    password: Option<Vec<u8>>,
    interval: Duration,
    timeout: Duration,
    debug: DebugLog,
    shared: Arc<PeerShared>,
    started: Instant,
}

impl Worker {
    fn run(mut self) {
        let reason = self.pump();
        self.relay.close(self.conn, reason);
        self.shared.finished.store(true, Ordering::Release);
        debug!(conn = %self.conn, port = self.socket.port(), %reason, "peer worker exited");
    }

    /// Pump until something ends the connection; the return value is
    /// the close reason reported over the relay.
    fn pump(&mut self) -> CloseReason {
        loop {
            if self.shared.deletion_requested.load(Ordering::Acquire) {
                return CloseReason::ClosedByPeer;
            }
            if let Err(reason) = self.relay_to_local() {
                return reason;
            }
            if let Err(reason) = self.local_to_relay() {
                return reason;
            }
            if self.idle() > self.timeout {
                debug!(conn = %self.conn, "idle timeout, retiring worker");
                self.shared.deletion_requested.store(true, Ordering::Release);
                return CloseReason::ClosedByPeer;
            }
            thread::sleep(self.interval);
        }
    }

    fn relay_to_local(&mut self) -> Result<(), CloseReason> {
        for _ in 0..MAX_PACKETS_PER_TICK {
            match self.relay.recv(self.conn) {
                Ok(Some(message)) => {
                    if self.shared.game_ready.load(Ordering::Acquire) {
                        self.forward_to_local(&message)?;
                    } else {
                        self.handle_control(&message)?;
                    }
                }
                Ok(None) => break,
                // Peer closed first; our own close becomes a no-op.
                Err(_) => return Err(CloseReason::ClosedByPeer),
            }
        }
        Ok(())
    }

    fn local_to_relay(&mut self) -> Result<(), CloseReason> {
        for _ in 0..MAX_PACKETS_PER_TICK {
            match self.socket.recv_from() {
                Ok((len, from)) => {
                    self.send_back = Some(from);
                    if !self.shared.game_ready.load(Ordering::Acquire) {
                        trace!(conn = %self.conn, len, "dropping local datagram before handshake");
                        continue;
                    }
                    let payload = &self.socket.recv_buffer()[..len];
                    if self.relay.send(self.conn, payload).is_err() {
                        return Err(CloseReason::ClosedByPeer);
                    }
                    if self.debug.packet_spam {
                        trace!(conn = %self.conn, len, "local → relay");
                    }
                    self.touch();
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(conn = %self.conn, error = %e, "local socket receive failed");
                    return Err(CloseReason::RemoteIssue);
                }
            }
        }
        Ok(())
    }

    fn forward_to_local(&mut self, message: &[u8]) -> Result<(), CloseReason> {
        let Some(addr) = self.send_back else {
            trace!(conn = %self.conn, "no send-back address yet, dropping relayed datagram");
            return Ok(());
        };
        match self.socket.send_to(message, addr) {
            Ok(_) => {
                if self.debug.packet_spam {
                    trace!(conn = %self.conn, len = message.len(), "relay → local");
                }
                self.touch();
                Ok(())
            }
            // Full send buffer: drop the datagram like the wire would.
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => {
                warn!(conn = %self.conn, error = %e, "local socket send failed");
                Err(CloseReason::RemoteIssue)
            }
        }
    }

    /// Pre-ready traffic is the control channel, not game data.
    fn handle_control(&mut self, message: &[u8]) -> Result<(), CloseReason> {
        if wire::is_need_pass(message) {
            let password = self.password.as_deref().unwrap_or_default();
            let reply = wire::password_reply(password);
            if self.relay.send(self.conn, &reply).is_err() {
                return Err(CloseReason::ClosedByPeer);
            }
            self.shared.game_ready.store(true, Ordering::Release);
            debug!(conn = %self.conn, "password presented, connection ready");
            Ok(())
        } else {
            // Never challenged: the host required no handshake and
            // this is game data already.
            self.shared.game_ready.store(true, Ordering::Release);
            self.forward_to_local(message)
        }
    }

    fn touch(&self) {
        let elapsed = self.started.elapsed().as_millis() as u64;
        self.shared.last_activity_ms.store(elapsed, Ordering::Relaxed);
    }

    fn idle(&self) -> Duration {
        let last = Duration::from_millis(self.shared.last_activity_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tether_transport::{ConnectionEvent, MemoryRelayHub};

    fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    struct Rig {
        host: Arc<dyn RelayTransport>,
        conn: RelayConn,
        game: LanSocket,
        peer: PeerConnection,
    }

    /// Host endpoint + a client-side worker pumping to a local "game"
    /// socket.
    fn rig(game_ready: bool, password: Option<&[u8]>, timeout: Duration) -> Rig {
        let hub = MemoryRelayHub::new();
        let host = hub.endpoint("host");
        let client = hub.endpoint("client");
        host.listen().unwrap();
        let conn = client.connect(&IdentityToken::new("host")).unwrap();
        host.poll_events();
        host.accept(conn).unwrap();

        let game = LanSocket::bind_in_range(47000..=47999, &[], true).unwrap();
        let worker_socket = LanSocket::bind_in_range(47000..=47999, &[game.port()], true).unwrap();
        let send_back = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), game.port());

        let peer = PeerConnection::spawn(PeerSetup {
            relay: Arc::new(client),
            conn,
            remote: IdentityToken::new("host"),
            socket: worker_socket,
            send_back: Some(send_back),
            game_ready,
            password: password.map(<[u8]>::to_vec),
            interval: Duration::from_millis(2),
            timeout,
            debug: DebugLog::default(),
        })
        .unwrap();

        Rig {
            host: Arc::new(host),
            conn,
            game,
            peer,
        }
    }

    #[test]
    fn test_pumps_both_directions_verbatim() {
        let mut r = rig(true, None, Duration::from_secs(10));

        // relay → local
        r.host.send(r.conn, b"from-relay").unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            matches!(r.game.recv_from(), Ok((10, _)))
        }));
        assert_eq!(&r.game.recv_buffer()[..10], b"from-relay");

        // local → relay
        let worker_addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), r.peer.port());
        r.game.send_to(b"from-game", worker_addr).unwrap();
        let mut got = None;
        assert!(wait_until(Duration::from_secs(2), || {
            match r.host.recv(r.conn) {
                Ok(Some(payload)) => {
                    got = Some(payload);
                    true
                }
                _ => false,
            }
        }));
        assert_eq!(got.unwrap(), b"from-game");
        assert!(r.peer.idle_for() < Duration::from_secs(2));
    }

    #[test]
    fn test_deletion_request_stops_worker() {
        let r = rig(true, None, Duration::from_secs(10));
        r.peer.request_deletion();
        assert!(wait_until(Duration::from_secs(2), || r.peer.is_finished()));

        // Worker reported an ordinary close to the other side.
        let events = r.host.poll_events();
        assert!(events.iter().any(|event| matches!(
            event,
            ConnectionEvent::Closed {
                reason: CloseReason::ClosedByPeer,
                ..
            }
        )));
    }

    #[test]
    fn test_idle_timeout_retires_worker() {
        let r = rig(true, None, Duration::from_millis(40));
        assert!(wait_until(Duration::from_secs(2), || r.peer.is_finished()));
        assert!(r.peer.deletion_requested());
    }

    #[test]
    fn test_need_pass_challenge_answered() {
        let r = rig(false, Some(b"abc123"), Duration::from_secs(10));
        assert!(!r.peer.game_ready());

        r.host.send(r.conn, wire::NEEDPASS).unwrap();
        let mut reply = None;
        assert!(wait_until(Duration::from_secs(2), || {
            match r.host.recv(r.conn) {
                Ok(Some(payload)) => {
                    reply = Some(payload);
                    true
                }
                _ => false,
            }
        }));
        assert_eq!(reply.unwrap(), b"OKabc123");
        assert!(r.peer.game_ready());
    }

    #[test]
    fn test_unchallenged_data_flips_ready_and_forwards() {
        let mut r = rig(false, Some(b"abc123"), Duration::from_secs(10));
        r.host.send(r.conn, b"\xff\xfe\x01game").unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            matches!(r.game.recv_from(), Ok(_))
        }));
        assert_eq!(&r.game.recv_buffer()[..7], b"\xff\xfe\x01game");
        assert!(r.peer.game_ready());
    }

    #[test]
    fn test_peer_close_finishes_worker() {
        let r = rig(true, None, Duration::from_secs(10));
        r.host.close(r.conn, CloseReason::ClosedByPeer);
        assert!(wait_until(Duration::from_secs(2), || r.peer.is_finished()));
    }
}
