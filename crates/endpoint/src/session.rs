//! Endpoint session: handshake, lifecycle and dispatch.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tether_link::{Correlator, Inbound, Mailbox, Peer, ReplyPort, RequestError, RequestId};
use tether_protocol::constants::REASON_UNKNOWN;
use tether_protocol::{Category, Decoded, Envelope, Kind, ListenerSet, Payload, codec};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::EndpointError;
use crate::config::EndpointConfig;
use crate::heartbeat::heartbeat_pump;

/// What endpoint listeners receive.
///
/// Every decoded envelope from the hub first goes to `event` listeners as
/// [`EndpointEvent::Event`]. `connected` and `disconnected` then update the
/// session; any other kind reaches `message` listeners.
#[derive(Debug, Clone)]
pub enum EndpointEvent {
    /// The hub acknowledged the handshake.
    Connected(Value),
    /// The hub dropped this endpoint. The session has already stopped.
    Disconnected { reason: String },
    /// The body of any envelope other than `connected` or `disconnected`.
    Message {
        kind: Kind,
        body: Value,
        reply: Option<ReplyPort>,
    },
    /// Any envelope from the hub.
    Event {
        envelope: Envelope,
        reply: Option<ReplyPort>,
    },
}

#[derive(Default)]
struct State {
    cancel: Option<CancellationToken>,
    connected: bool,
}

struct EndpointCore {
    config: EndpointConfig,
    hub: Correlator,
    listeners: ListenerSet<Category, EndpointEvent>,
    state: Mutex<State>,
}

impl EndpointCore {
    /// Handles one frame. Returns `false` once the loop must stop.
    fn dispatch(&self, inbound: Inbound, cancel: &CancellationToken) -> bool {
        let hub_id = self.hub.peer().id();
        if inbound.source.id() != hub_id {
            tracing::trace!(peer = %inbound.source.id(), "ignoring frame from non-hub peer");
            return true;
        }

        let envelope = match codec::decode(&inbound.data) {
            Decoded::Envelope(envelope) => envelope,
            Decoded::NotOurs => {
                tracing::trace!(hub = %hub_id, "ignoring foreign traffic");
                return true;
            }
            Decoded::Malformed(malformed) => {
                tracing::warn!(hub = %hub_id, reason = malformed.as_str(), "malformed frame");
                return true;
            }
        };
        tracing::trace!(hub = %hub_id, kind = %envelope.kind, "frame received");

        if !self.listeners.is_empty(&Category::Event) {
            let event = EndpointEvent::Event {
                envelope: envelope.clone(),
                reply: inbound.reply.clone(),
            };
            self.listeners.emit(&Category::Event, &event);
        }

        match envelope.kind {
            Kind::Connected => {
                self.state.lock().connected = true;
                tracing::info!(hub = %hub_id, "connected");
                self.listeners
                    .emit(&Category::Connected, &EndpointEvent::Connected(envelope.body));
            }
            Kind::Disconnected => {
                let reason = envelope.body_str().unwrap_or(REASON_UNKNOWN).to_owned();
                {
                    let mut state = self.state.lock();
                    state.connected = false;
                    // Only clear the token this loop was started with.
                    if !cancel.is_cancelled() {
                        state.cancel = None;
                        cancel.cancel();
                    }
                }
                tracing::info!(hub = %hub_id, %reason, "disconnected by hub");
                self.listeners.emit(
                    &Category::Disconnected,
                    &EndpointEvent::Disconnected { reason },
                );
                return false;
            }
            kind => {
                if kind == Kind::Error {
                    tracing::warn!(hub = %hub_id, error = %envelope.body, "hub reported error");
                }
                let event = EndpointEvent::Message {
                    kind,
                    body: envelope.body,
                    reply: inbound.reply,
                };
                self.listeners.emit(&Category::Message, &event);
            }
        }
        true
    }
}

/// The endpoint role.
///
/// Created idle; [`listen`](Self::listen) starts the read loop and the
/// heartbeat pump and sends `connect`. Either [`close`](Self::close) or a
/// `disconnected` notice from the hub returns it to idle.
pub struct EndpointSession {
    core: Arc<EndpointCore>,
    mailbox: Arc<AsyncMutex<Mailbox>>,
}

impl EndpointSession {
    pub fn new(config: EndpointConfig, hub: Peer, mailbox: Mailbox) -> Result<Self, EndpointError> {
        config.validate()?;
        Ok(Self {
            core: Arc::new(EndpointCore {
                config,
                hub: Correlator::new(hub),
                listeners: ListenerSet::new(),
                state: Mutex::new(State::default()),
            }),
            mailbox: Arc::new(AsyncMutex::new(mailbox)),
        })
    }

    pub fn hub(&self) -> &Peer {
        self.core.hub.peer()
    }

    /// Starts the read loop and heartbeat pump, then sends `connect`.
    ///
    /// Must be called from within a tokio runtime. If `connect` cannot be
    /// sent the session stays idle.
    pub fn listen(&self) -> Result<(), EndpointError> {
        let cancel = {
            let mut state = self.core.state.lock();
            if state.cancel.is_some() {
                return Err(EndpointError::AlreadyListening);
            }
            let cancel = CancellationToken::new();
            state.cancel = Some(cancel.clone());
            cancel
        };

        tokio::spawn(read_loop(
            Arc::clone(&self.core),
            Arc::clone(&self.mailbox),
            cancel.clone(),
        ));

        if let Err(e) = self.core.hub.send(Envelope::new(Kind::Connect)) {
            self.core.state.lock().cancel = None;
            cancel.cancel();
            return Err(e.into());
        }

        tokio::spawn(heartbeat_pump(
            self.core.hub.peer().clone(),
            self.core.config.heartbeat_interval,
            cancel,
        ));

        tracing::info!(hub = %self.core.hub.peer().id(), "endpoint listening");
        Ok(())
    }

    /// Stops the read loop and heartbeat pump.
    ///
    /// The hub is not notified; it evicts the endpoint once heartbeats stop.
    pub fn close(&self) -> Result<(), EndpointError> {
        let cancel = {
            let mut state = self.core.state.lock();
            let cancel = state.cancel.take().ok_or(EndpointError::NotListening)?;
            state.connected = false;
            cancel
        };
        cancel.cancel();
        tracing::info!(hub = %self.core.hub.peer().id(), "endpoint closed");
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.core.state.lock().cancel.is_some()
    }

    /// Returns `true` between the hub's `connected` ack and the end of the
    /// session.
    pub fn is_connected(&self) -> bool {
        self.core.state.lock().connected
    }

    /// Subscribes to `message`, `connected`, `disconnected` or `event`.
    pub fn on<F>(&self, category: Category, listener: F) -> Result<(), EndpointError>
    where
        F: Fn(&EndpointEvent) + Send + Sync + 'static,
    {
        match category {
            Category::Message | Category::Connected | Category::Disconnected | Category::Event => {
                self.core.listeners.add(category, listener);
                Ok(())
            }
            Category::Connection => Err(EndpointError::UnsupportedCategory(category)),
        }
    }

    /// Sends a payload to the hub without expecting a reply.
    pub fn send(&self, payload: impl Into<Payload>) -> Result<(), EndpointError> {
        Ok(self.core.hub.send(payload)?)
    }

    /// Sends a request using the configured request timeout.
    pub fn request<F>(&self, payload: impl Into<Payload>, on_reply: F) -> Result<RequestId, EndpointError>
    where
        F: FnOnce(Result<Envelope, RequestError>) + Send + 'static,
    {
        self.request_with_timeout(payload, self.core.config.request_timeout, on_reply)
    }

    /// Sends a request with an explicit timeout (zero = wait forever).
    pub fn request_with_timeout<F>(
        &self,
        payload: impl Into<Payload>,
        timeout: Duration,
        on_reply: F,
    ) -> Result<RequestId, EndpointError>
    where
        F: FnOnce(Result<Envelope, RequestError>) + Send + 'static,
    {
        Ok(self.core.hub.request(payload, timeout, on_reply)?)
    }

    /// Sends a request and waits for its outcome.
    pub async fn ask(&self, payload: impl Into<Payload>) -> Result<Envelope, EndpointError> {
        Ok(self
            .core
            .hub
            .ask(payload, self.core.config.request_timeout)
            .await?)
    }
}

impl Drop for EndpointSession {
    fn drop(&mut self) {
        if let Some(cancel) = self.core.state.lock().cancel.take() {
            cancel.cancel();
        }
    }
}

async fn read_loop(
    core: Arc<EndpointCore>,
    mailbox: Arc<AsyncMutex<Mailbox>>,
    cancel: CancellationToken,
) {
    // Held for the loop's lifetime; a re-listen waits here for the old loop.
    let mut mailbox = mailbox.lock().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            inbound = mailbox.recv() => match inbound {
                Some(inbound) => {
                    if !core.dispatch(inbound, &cancel) {
                        break;
                    }
                }
                None => {
                    tracing::debug!("endpoint transport closed");
                    break;
                }
            },
        }
    }
    tracing::debug!("endpoint read loop stopped");
}
