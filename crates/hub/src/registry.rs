//! Table of live connections, keyed by peer identity.
//!
//! The table only stores and answers; handshake policy, notices and
//! listeners live in the session. Each connection owns the correlator used
//! for requests sent to it.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tether_link::{Correlator, Peer};
use tether_protocol::PeerId;
use tokio::time::Instant;

/// Hub-side record of one live endpoint.
pub struct Connection {
    correlator: Correlator,
    connected_at: Instant,
    last_heartbeat_at: Instant,
}

impl Connection {
    fn new(peer: Peer, now: Instant) -> Self {
        Self {
            correlator: Correlator::new(peer),
            connected_at: now,
            last_heartbeat_at: now,
        }
    }

    pub fn peer(&self) -> &Peer {
        self.correlator.peer()
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    pub fn last_heartbeat_at(&self) -> Instant {
        self.last_heartbeat_at
    }
}

/// Live connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    table: Mutex<HashMap<PeerId, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection seeded with `now` as its last heartbeat.
    ///
    /// Returns `false`, leaving the table untouched, if the identity is
    /// already present.
    pub fn insert(&self, peer: Peer, now: Instant) -> bool {
        let mut table = self.table.lock();
        if table.contains_key(peer.id()) {
            return false;
        }
        table.insert(peer.id().clone(), Connection::new(peer, now));
        true
    }

    /// Removes and returns a connection.
    pub fn remove(&self, id: &PeerId) -> Option<Connection> {
        self.table.lock().remove(id)
    }

    /// Records a heartbeat. Returns `false` for unknown identities.
    pub fn touch(&self, id: &PeerId, now: Instant) -> bool {
        match self.table.lock().get_mut(id) {
            Some(conn) => {
                conn.last_heartbeat_at = now;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.table.lock().contains_key(id)
    }

    pub fn peer(&self, id: &PeerId) -> Option<Peer> {
        self.table.lock().get(id).map(|conn| conn.peer().clone())
    }

    /// Returns the correlator for a connection.
    pub fn correlator(&self, id: &PeerId) -> Option<Correlator> {
        self.table.lock().get(id).map(|conn| conn.correlator.clone())
    }

    /// Removes and returns every connection silent for longer than `window`
    /// as of `now`.
    ///
    /// Checked and removed under one lock, so a heartbeat recorded before
    /// the sweep takes the lock always keeps its connection.
    pub fn remove_stale(&self, now: Instant, window: Duration) -> Vec<(PeerId, Connection)> {
        let mut table = self.table.lock();
        let stale: Vec<PeerId> = table
            .iter()
            .filter(|(_, conn)| now.saturating_duration_since(conn.last_heartbeat_at) > window)
            .map(|(id, _)| id.clone())
            .collect();
        stale
            .into_iter()
            .filter_map(|id| table.remove(&id).map(|conn| (id, conn)))
            .collect()
    }

    /// All connected identities, sorted.
    pub fn identities(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.table.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}
