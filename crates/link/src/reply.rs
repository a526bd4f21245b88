//! Single-use reply paths.
//!
//! A reply path is opened for one outgoing request and travels with it to
//! the far side. The requester only ever consumes the first delivery; the
//! port is cloneable because transports may duplicate it, and anything
//! arriving after the first delivery is discarded.

use serde_json::Value;
use tether_protocol::{Payload, codec};
use tokio::sync::mpsc;

use crate::error::LinkError;

/// What travels back over a reply path.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Encoded envelope text.
    Text(String),
    /// Error payload reported by the far side.
    Failure(Value),
}

/// Sending side of a reply path, handed to whoever answers the request.
#[derive(Debug, Clone)]
pub struct ReplyPort {
    tx: mpsc::UnboundedSender<Reply>,
}

impl ReplyPort {
    /// Encodes and sends a reply payload.
    pub fn send(&self, payload: impl Into<Payload>) -> Result<(), LinkError> {
        let data = codec::encode(payload)?;
        self.post(Reply::Text(data))
    }

    /// Reports an error to the requester.
    pub fn fail(&self, error: impl Into<Value>) -> Result<(), LinkError> {
        self.post(Reply::Failure(error.into()))
    }

    /// Posts a reply as-is.
    ///
    /// Fails with [`LinkError::Closed`] once the requester has resolved (by
    /// an earlier reply or by timeout) and stopped listening.
    pub fn post(&self, reply: Reply) -> Result<(), LinkError> {
        self.tx.send(reply).map_err(|_| LinkError::Closed)
    }

    /// Returns `true` while the requester is still waiting.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Receiving side of a reply path, held by the requester.
#[derive(Debug)]
pub struct ReplyInbox {
    rx: mpsc::UnboundedReceiver<Reply>,
}

impl ReplyInbox {
    /// Waits for the next reply. `None` once every port has been dropped.
    pub async fn recv(&mut self) -> Option<Reply> {
        self.rx.recv().await
    }
}

/// Opens a reply path.
pub fn reply_channel() -> (ReplyPort, ReplyInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ReplyPort { tx }, ReplyInbox { rx })
}
