use std::fmt;
use std::sync::Arc;

use tether_protocol::{PeerId, Payload, codec};
use tokio::sync::mpsc;

use crate::error::LinkError;
use crate::reply::ReplyPort;

/// Outbound half of a transport: delivers text to one addressed peer.
///
/// Implementations must not block. A peer that is gone is reported as
/// [`LinkError::Closed`].
pub trait Link: Send + Sync + 'static {
    /// Posts `data`, optionally with a reply path attached.
    fn post(&self, data: String, reply: Option<ReplyPort>) -> Result<(), LinkError>;
}

/// An addressable peer: its identity plus the link that reaches it.
///
/// Cloneable; wraps an `Arc<dyn Link>`.
#[derive(Clone)]
pub struct Peer {
    id: PeerId,
    link: Arc<dyn Link>,
}

impl Peer {
    pub fn new(id: impl Into<PeerId>, link: Arc<dyn Link>) -> Self {
        Self {
            id: id.into(),
            link,
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Posts raw text, bypassing the codec.
    pub fn post(&self, data: String, reply: Option<ReplyPort>) -> Result<(), LinkError> {
        self.link.post(data, reply)
    }

    /// Encodes and sends a payload.
    pub fn send(&self, payload: impl Into<Payload>) -> Result<(), LinkError> {
        let data = codec::encode(payload)?;
        tracing::trace!(peer = %self.id, "posting frame");
        self.link.post(data, None)
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer").field("id", &self.id).finish()
    }
}

/// One message delivered by the transport.
pub struct Inbound {
    /// Raw text as received.
    pub data: String,
    /// Who sent it, and how to answer them.
    pub source: Peer,
    /// Reply path, when the sender asked for one.
    pub reply: Option<ReplyPort>,
}

impl fmt::Debug for Inbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inbound")
            .field("source", &self.source.id)
            .field("len", &self.data.len())
            .field("reply", &self.reply.is_some())
            .finish()
    }
}

/// Receiving end of a transport, drained by one session.
pub type Mailbox = mpsc::UnboundedReceiver<Inbound>;
