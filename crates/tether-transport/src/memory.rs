//! In-memory relay backend.
//!
//! A [`MemoryRelayHub`] stands in for the relay network inside one
//! process: every participant gets a [`MemoryRelay`] endpoint from the
//! hub, and messages move between endpoints over crossbeam channels.
//! This is the backend used by the loopback demo and the test suite;
//! it performs no NAT traversal and never leaves the process.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::relay::{
    CloseReason, ConnectionEvent, IdentityToken, ListenHandle, RelayConn, RelayTransport,
    TransportError, TransportResult,
};

type Inbox = Receiver<Vec<u8>>;
type InboxHandoff = (u64, Inbox);

struct EndpointEntry {
    events: Sender<ConnectionEvent>,
    inbox_handoff: Sender<InboxHandoff>,
    listening: bool,
}

struct ConnEntry {
    initiator: IdentityToken,
    target: IdentityToken,
    to_initiator: Sender<Vec<u8>>,
    to_target: Sender<Vec<u8>>,
    established: bool,
}

impl ConnEntry {
    /// Sender that delivers to the side opposite `from`, if `from` is
    /// a side of this connection at all.
    fn towards_other(&self, from: &IdentityToken) -> Option<&Sender<Vec<u8>>> {
        if *from == self.initiator {
            Some(&self.to_target)
        } else if *from == self.target {
            Some(&self.to_initiator)
        } else {
            None
        }
    }

    fn other_side(&self, from: &IdentityToken) -> Option<&IdentityToken> {
        if *from == self.initiator {
            Some(&self.target)
        } else if *from == self.target {
            Some(&self.initiator)
        } else {
            None
        }
    }
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    endpoints: HashMap<IdentityToken, EndpointEntry>,
    conns: HashMap<u64, ConnEntry>,
}

impl HubState {
    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn push_event(&self, to: &IdentityToken, event: ConnectionEvent) {
        if let Some(entry) = self.endpoints.get(to) {
            let _ = entry.events.send(event);
        }
    }
}

/// In-process stand-in for the relay network.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryRelayHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryRelayHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint under `identity` and return its transport
    /// handle. Re-registering an identity replaces the stale endpoint.
    pub fn endpoint(&self, identity: impl Into<IdentityToken>) -> MemoryRelay {
        let identity = identity.into();
        let (events_tx, events_rx) = unbounded();
        let (handoff_tx, handoff_rx) = unbounded();

        let mut state = self.state.lock().expect("hub lock poisoned");
        if state
            .endpoints
            .insert(
                identity.clone(),
                EndpointEntry {
                    events: events_tx,
                    inbox_handoff: handoff_tx,
                    listening: false,
                },
            )
            .is_some()
        {
            warn!(%identity, "replacing stale relay endpoint registration");
        }

        MemoryRelay {
            identity,
            state: Arc::clone(&self.state),
            events: events_rx,
            inbox_handoff: handoff_rx,
            inboxes: Mutex::new(HashMap::new()),
        }
    }
}

/// One participant's view of a [`MemoryRelayHub`].
pub struct MemoryRelay {
    identity: IdentityToken,
    state: Arc<Mutex<HubState>>,
    events: Receiver<ConnectionEvent>,
    inbox_handoff: Receiver<InboxHandoff>,
    inboxes: Mutex<HashMap<u64, Inbox>>,
}

impl MemoryRelay {
    /// Identity this endpoint is registered under.
    #[must_use]
    pub fn identity(&self) -> &IdentityToken {
        &self.identity
    }

    /// Pull newly created connection inboxes out of the handoff queue
    /// into the local map. Called from both the registry thread and
    /// the workers; the map lock serializes them.
    fn adopt_inboxes(&self) {
        let mut inboxes = self.inboxes.lock().expect("inbox lock poisoned");
        while let Ok((conn, rx)) = self.inbox_handoff.try_recv() {
            inboxes.insert(conn, rx);
        }
    }
}

impl RelayTransport for MemoryRelay {
    fn listen(&self) -> TransportResult<ListenHandle> {
        let mut state = self.state.lock().expect("hub lock poisoned");
        let handle = ListenHandle(state.fresh_id());
        let entry = state
            .endpoints
            .get_mut(&self.identity)
            .ok_or(TransportError::Unavailable)?;
        if entry.listening {
            return Err(TransportError::AlreadyListening);
        }
        entry.listening = true;
        debug!(identity = %self.identity, "relay endpoint listening");
        Ok(handle)
    }

    fn close_listener(&self, _listener: ListenHandle) {
        let mut state = self.state.lock().expect("hub lock poisoned");
        if let Some(entry) = state.endpoints.get_mut(&self.identity) {
            entry.listening = false;
        }
    }

    fn connect(&self, remote: &IdentityToken) -> TransportResult<RelayConn> {
        let mut state = self.state.lock().expect("hub lock poisoned");
        let listening = match state.endpoints.get(remote) {
            Some(entry) => entry.listening,
            None => return Err(TransportError::UnknownPeer(remote.clone())),
        };
        let conn = RelayConn(state.fresh_id());

        if !listening {
            // Reachable but not accepting: reported asynchronously,
            // the way a real relay rejection arrives.
            state.push_event(
                &self.identity,
                ConnectionEvent::Closed {
                    conn,
                    reason: CloseReason::NotOpen,
                },
            );
            return Ok(conn);
        }

        let (to_initiator, initiator_rx) = unbounded();
        let (to_target, target_rx) = unbounded();
        if let Some(me) = state.endpoints.get(&self.identity) {
            let _ = me.inbox_handoff.send((conn.0, initiator_rx));
        }
        if let Some(other) = state.endpoints.get(remote) {
            let _ = other.inbox_handoff.send((conn.0, target_rx));
        }
        state.conns.insert(
            conn.0,
            ConnEntry {
                initiator: self.identity.clone(),
                target: remote.clone(),
                to_initiator,
                to_target,
                established: false,
            },
        );
        state.push_event(
            remote,
            ConnectionEvent::Connecting {
                conn,
                remote: self.identity.clone(),
            },
        );
        debug!(from = %self.identity, to = %remote, %conn, "relay connect attempt");
        Ok(conn)
    }

    fn accept(&self, conn: RelayConn) -> TransportResult<()> {
        let mut state = self.state.lock().expect("hub lock poisoned");
        let entry = state
            .conns
            .get_mut(&conn.0)
            .ok_or(TransportError::ConnectionClosed)?;
        if entry.target != self.identity || entry.established {
            return Err(TransportError::ConnectionClosed);
        }
        entry.established = true;
        let initiator = entry.initiator.clone();
        let target = entry.target.clone();
        state.push_event(
            &target,
            ConnectionEvent::Connected {
                conn,
                remote: initiator.clone(),
            },
        );
        state.push_event(
            &initiator,
            ConnectionEvent::Connected {
                conn,
                remote: target,
            },
        );
        Ok(())
    }

    fn send(&self, conn: RelayConn, payload: &[u8]) -> TransportResult<()> {
        let state = self.state.lock().expect("hub lock poisoned");
        let entry = state
            .conns
            .get(&conn.0)
            .ok_or(TransportError::ConnectionClosed)?;
        if !entry.established {
            return Err(TransportError::ConnectionClosed);
        }
        let tx = entry
            .towards_other(&self.identity)
            .ok_or(TransportError::ConnectionClosed)?;
        tx.send(payload.to_vec())
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn recv(&self, conn: RelayConn) -> TransportResult<Option<Vec<u8>>> {
        self.adopt_inboxes();
        let mut inboxes = self.inboxes.lock().expect("inbox lock poisoned");
        let Some(rx) = inboxes.get(&conn.0) else {
            return Err(TransportError::ConnectionClosed);
        };
        match rx.try_recv() {
            Ok(payload) => Ok(Some(payload)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                inboxes.remove(&conn.0);
                Err(TransportError::ConnectionClosed)
            }
        }
    }

    fn poll_events(&self) -> Vec<ConnectionEvent> {
        self.adopt_inboxes();
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    fn close(&self, conn: RelayConn, reason: CloseReason) {
        let mut state = self.state.lock().expect("hub lock poisoned");
        let Some(entry) = state.conns.get(&conn.0) else {
            return;
        };
        let Some(other) = entry.other_side(&self.identity).cloned() else {
            return;
        };
        state.conns.remove(&conn.0);
        state.push_event(&other, ConnectionEvent::Closed { conn, reason });
        debug!(identity = %self.identity, %conn, %reason, "relayed connection closed");
        drop(state);

        let mut inboxes = self.inboxes.lock().expect("inbox lock poisoned");
        inboxes.remove(&conn.0);
    }
}
