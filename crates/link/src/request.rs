//! Request/reply correlation.
//!
//! Every request gets its own reply path and its own timer. Whichever comes
//! first (a reply, a remote error, or the timeout) resolves the request and
//! the other is discarded. The callback is `FnOnce`, so a request can never
//! be answered twice.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tether_protocol::{Decoded, Envelope, Kind, Payload, codec};
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{LinkError, RequestError};
use crate::link::Peer;
use crate::reply::{Reply, ReplyInbox, reply_channel};

/// Identifies one in-flight request.
pub type RequestId = Uuid;

/// Bookkeeping for one request still waiting for its outcome.
#[derive(Debug)]
struct PendingRequest {
    kind: Kind,
    sent_at: Instant,
}

/// Sends to one peer and correlates replies with the requests that asked
/// for them.
///
/// Cloneable; clones share the pending table.
#[derive(Clone)]
pub struct Correlator {
    peer: Peer,
    pending: Arc<Mutex<HashMap<RequestId, PendingRequest>>>,
}

impl Correlator {
    pub fn new(peer: Peer) -> Self {
        Self {
            peer,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The peer this correlator talks to.
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Fire-and-forget send. No reply path is opened.
    pub fn send(&self, payload: impl Into<Payload>) -> Result<(), LinkError> {
        self.peer.send(payload)
    }

    /// Sends `payload` with a fresh reply path and arms a timer.
    ///
    /// `on_reply` runs exactly once, on a spawned task, with the first of:
    /// the decoded reply, the far side's error payload, or
    /// [`RequestError::Timeout`]. A zero `timeout` disables the timer and the
    /// request waits for as long as it takes. A reply path dropped unanswered
    /// by the far side counts as silence.
    ///
    /// Must be called from within a tokio runtime. Errors returned here mean
    /// nothing was sent and `on_reply` will not run.
    pub fn request<F>(
        &self,
        payload: impl Into<Payload>,
        timeout: Duration,
        on_reply: F,
    ) -> Result<RequestId, RequestError>
    where
        F: FnOnce(Result<Envelope, RequestError>) + Send + 'static,
    {
        let payload = payload.into();
        let kind = payload.kind().clone();
        let data = codec::encode(payload)?;

        let (port, inbox) = reply_channel();
        self.peer.post(data, Some(port))?;

        let id = Uuid::new_v4();
        let sent_at = Instant::now();
        tracing::debug!(peer = %self.peer.id(), %kind, request = %id, "request sent");
        self.pending
            .lock()
            .insert(id, PendingRequest { kind, sent_at });

        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            let outcome = await_reply(inbox, sent_at, timeout).await;

            let resolved = pending.lock().remove(&id);
            if let Some(req) = resolved {
                tracing::debug!(
                    request = %id,
                    kind = %req.kind,
                    elapsed = ?req.sent_at.elapsed(),
                    ok = outcome.is_ok(),
                    "request resolved"
                );
                on_reply(outcome);
            }
        });

        Ok(id)
    }

    /// Async form of [`request`](Self::request).
    pub async fn ask(
        &self,
        payload: impl Into<Payload>,
        timeout: Duration,
    ) -> Result<Envelope, RequestError> {
        let (tx, rx) = oneshot::channel();
        self.request(payload, timeout, move |outcome| {
            let _ = tx.send(outcome);
        })?;
        rx.await
            .unwrap_or(Err(RequestError::Link(LinkError::Closed)))
    }

    /// Number of requests still waiting for an outcome.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Waits for the first outcome on a reply path.
///
/// Consumes the inbox, so once this returns every later delivery on the
/// same path is refused at the sender.
async fn await_reply(
    mut inbox: ReplyInbox,
    sent_at: Instant,
    timeout: Duration,
) -> Result<Envelope, RequestError> {
    let first = async {
        match inbox.recv().await {
            Some(reply) => reply,
            None => std::future::pending().await,
        }
    };

    let reply = if timeout.is_zero() {
        first.await
    } else {
        tokio::time::timeout_at(sent_at + timeout, first)
            .await
            .map_err(|_| RequestError::Timeout(timeout))?
    };

    match reply {
        Reply::Text(text) => match codec::decode(&text) {
            Decoded::Envelope(envelope) => Ok(envelope),
            Decoded::NotOurs => Err(RequestError::InvalidReply("not a protocol frame".into())),
            Decoded::Malformed(reason) => Err(RequestError::InvalidReply(reason.as_str().into())),
        },
        Reply::Failure(error) => Err(RequestError::Remote(error)),
    }
}
