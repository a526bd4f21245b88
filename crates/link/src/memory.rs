//! In-process transport.
//!
//! Each participant owns a [`MemoryPort`] (its address) and the [`Mailbox`]
//! that port delivers into. [`MemoryPort::connect`] yields a [`Peer`] that
//! reaches another port; messages posted through it arrive stamped with the
//! local identity and a source handle pointing back, the way a real
//! transport reports the sender. Dropping a mailbox makes its port
//! unreachable.

use std::sync::Arc;

use tether_protocol::PeerId;
use tokio::sync::mpsc;

use crate::error::LinkError;
use crate::link::{Inbound, Link, Mailbox, Peer};
use crate::reply::ReplyPort;

/// Address of one in-process participant.
#[derive(Debug, Clone)]
pub struct MemoryPort {
    id: PeerId,
    tx: mpsc::UnboundedSender<Inbound>,
}

impl MemoryPort {
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Returns a peer handle that posts from this port to `remote`.
    pub fn connect(&self, remote: &MemoryPort) -> Peer {
        Peer::new(
            remote.id.clone(),
            Arc::new(MemoryLink {
                local: self.clone(),
                remote: remote.clone(),
            }),
        )
    }

    /// Returns `true` while the port's mailbox is still being held.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Opens a port with the given identity.
pub fn port(id: impl Into<PeerId>) -> (MemoryPort, Mailbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MemoryPort { id: id.into(), tx }, rx)
}

struct MemoryLink {
    local: MemoryPort,
    remote: MemoryPort,
}

impl Link for MemoryLink {
    fn post(&self, data: String, reply: Option<ReplyPort>) -> Result<(), LinkError> {
        let inbound = Inbound {
            data,
            source: self.remote.connect(&self.local),
            reply,
        };
        self.remote.tx.send(inbound).map_err(|_| LinkError::Closed)
    }
}
