//! Hub session: handshake policy, routing and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tether_link::{Correlator, Inbound, Mailbox, Peer, ReplyPort, RequestError, RequestId};
use tether_protocol::constants::{
    ERR_NOT_CONNECTED, REASON_ALREADY_CONNECTED, REASON_HEARTBEAT_TIMEOUT,
};
use tether_protocol::{
    Category, Decoded, Envelope, Kind, ListenerSet, Payload, PeerId, ProtocolError, codec,
};
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::HubError;
use crate::config::HubConfig;
use crate::connection::ConnectionHandle;
use crate::registry::{Connection, ConnectionRegistry};
use crate::watcher::LivenessWatcher;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// What hub listeners receive.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// A `message` envelope from a connected endpoint.
    Message {
        from: ConnectionHandle,
        body: Value,
        reply: Option<ReplyPort>,
    },
    /// An endpoint completed the handshake.
    Connection(ConnectionHandle),
    /// An endpoint was removed.
    Disconnected { id: PeerId, reason: String },
    /// Any other envelope from a connected endpoint.
    Event {
        from: ConnectionHandle,
        envelope: Envelope,
        reply: Option<ReplyPort>,
    },
}

/// What per-kind taps receive: every decoded envelope of the tapped kind,
/// before routing, whether or not the sender is connected.
#[derive(Debug, Clone)]
pub struct Tap {
    pub from: PeerId,
    pub envelope: Envelope,
    pub reply: Option<ReplyPort>,
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

/// State shared by the session, its tasks and connection handles.
pub(crate) struct HubCore {
    pub(crate) config: HubConfig,
    pub(crate) registry: ConnectionRegistry,
    listeners: ListenerSet<Category, HubEvent>,
    taps: ListenerSet<Kind, Tap>,
}

impl HubCore {
    fn new(config: HubConfig) -> Self {
        Self {
            config,
            registry: ConnectionRegistry::new(),
            listeners: ListenerSet::new(),
            taps: ListenerSet::new(),
        }
    }

    fn handle(self: &Arc<Self>, id: PeerId) -> ConnectionHandle {
        ConnectionHandle::new(id, self)
    }

    pub(crate) fn dispatch(self: &Arc<Self>, inbound: Inbound) {
        let Inbound {
            data,
            source,
            reply,
        } = inbound;
        let from = source.id().clone();

        if from == self.config.identity {
            tracing::trace!(peer = %from, "dropping frame from own identity");
            return;
        }

        let envelope = match codec::decode(&data) {
            Decoded::Envelope(envelope) => envelope,
            Decoded::NotOurs => {
                tracing::trace!(peer = %from, "ignoring foreign traffic");
                return;
            }
            Decoded::Malformed(malformed) => {
                tracing::warn!(peer = %from, reason = malformed.as_str(), "malformed frame");
                if let Err(e) = source.send(Envelope::error(malformed.as_str())) {
                    tracing::warn!(peer = %from, "failed to report malformed frame: {e}");
                }
                return;
            }
        };
        tracing::trace!(peer = %from, kind = %envelope.kind, "frame received");

        if !self.taps.is_empty(&envelope.kind) {
            let tap = Tap {
                from: from.clone(),
                envelope: envelope.clone(),
                reply: reply.clone(),
            };
            self.taps.emit(&envelope.kind, &tap);
        }

        match &envelope.kind {
            Kind::Connect => {
                self.register_connection(source);
            }
            Kind::Heartbeat => {
                if !self.registry.touch(&from, Instant::now()) {
                    tracing::trace!(peer = %from, "heartbeat from unconnected peer ignored");
                }
            }
            kind if !self.registry.contains(&from) => {
                tracing::debug!(peer = %from, %kind, "frame from unconnected peer");
                if let Err(e) = source.send(Envelope::error(ERR_NOT_CONNECTED)) {
                    tracing::warn!(peer = %from, "failed to send not-connected: {e}");
                }
            }
            Kind::Message => {
                let event = HubEvent::Message {
                    from: self.handle(from),
                    body: envelope.body,
                    reply,
                };
                self.listeners.emit(&Category::Message, &event);
            }
            _ => {
                let event = HubEvent::Event {
                    from: self.handle(from),
                    envelope,
                    reply,
                };
                self.listeners.emit(&Category::Event, &event);
            }
        }
    }

    pub(crate) fn register_connection(self: &Arc<Self>, peer: Peer) -> bool {
        let id = peer.id().clone();
        if !self.registry.insert(peer.clone(), Instant::now()) {
            tracing::warn!(peer = %id, "duplicate connect");
            self.disconnect(&id, REASON_ALREADY_CONNECTED);
            return false;
        }

        tracing::info!(peer = %id, connections = self.registry.len(), "endpoint connected");
        if let Err(e) = peer.send(Envelope::new(Kind::Connected)) {
            tracing::warn!(peer = %id, "failed to acknowledge connect: {e}");
        }
        self.listeners
            .emit(&Category::Connection, &HubEvent::Connection(self.handle(id)));
        true
    }

    pub(crate) fn disconnect(&self, id: &PeerId, reason: &str) -> bool {
        let Some(conn) = self.registry.remove(id) else {
            tracing::trace!(peer = %id, reason, "disconnect for absent peer");
            return false;
        };
        self.finish_disconnect(id, &conn, reason);
        true
    }

    /// Notifies a connection already removed from the registry.
    fn finish_disconnect(&self, id: &PeerId, conn: &Connection, reason: &str) {
        if let Err(e) = conn.peer().send(Envelope::disconnected(reason)) {
            tracing::debug!(peer = %id, "disconnect notice not delivered: {e}");
        }
        tracing::info!(
            peer = %id,
            reason,
            uptime = ?conn.connected_at().elapsed(),
            "endpoint disconnected"
        );

        let event = HubEvent::Disconnected {
            id: id.clone(),
            reason: reason.to_owned(),
        };
        self.listeners.emit(&Category::Disconnected, &event);
    }

    /// Evicts every connection silent for longer than the heartbeat timeout.
    fn evict_stale(&self, now: Instant) -> usize {
        let evicted = self
            .registry
            .remove_stale(now, self.config.heartbeat_timeout);
        for (id, conn) in &evicted {
            tracing::info!(peer = %id, "no heartbeat within {:?}", self.config.heartbeat_timeout);
            self.finish_disconnect(id, conn, REASON_HEARTBEAT_TIMEOUT);
        }
        evicted.len()
    }

    pub(crate) fn send_to(&self, id: &PeerId, payload: impl Into<Payload>) -> Result<(), HubError> {
        let peer = self
            .registry
            .peer(id)
            .ok_or_else(|| HubError::UnknownConnection(id.clone()))?;
        peer.send(payload)?;
        Ok(())
    }

    pub(crate) fn correlator(&self, id: &PeerId) -> Result<Correlator, HubError> {
        self.registry
            .correlator(id)
            .ok_or_else(|| HubError::UnknownConnection(id.clone()))
    }

    pub(crate) fn request_to<F>(
        &self,
        id: &PeerId,
        payload: impl Into<Payload>,
        timeout: Duration,
        on_reply: F,
    ) -> Result<RequestId, HubError>
    where
        F: FnOnce(Result<Envelope, RequestError>) + Send + 'static,
    {
        Ok(self.correlator(id)?.request(payload, timeout, on_reply)?)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The hub role.
///
/// Created idle; [`listen`](Self::listen) starts the read loop and the
/// liveness watcher, [`close`](Self::close) stops both. Frames arriving
/// while idle stay queued in the mailbox.
pub struct HubSession {
    core: Arc<HubCore>,
    mailbox: Arc<AsyncMutex<Mailbox>>,
    lifecycle: Mutex<Lifecycle>,
}

struct Lifecycle {
    watcher: LivenessWatcher,
    cancel: Option<CancellationToken>,
}

impl HubSession {
    pub fn new(config: HubConfig, mailbox: Mailbox) -> Result<Self, HubError> {
        config.validate()?;
        let watcher = LivenessWatcher::new(config.heartbeat_interval);
        Ok(Self {
            core: Arc::new(HubCore::new(config)),
            mailbox: Arc::new(AsyncMutex::new(mailbox)),
            lifecycle: Mutex::new(Lifecycle {
                watcher,
                cancel: None,
            }),
        })
    }

    pub fn identity(&self) -> &PeerId {
        &self.core.config.identity
    }

    pub fn config(&self) -> &HubConfig {
        &self.core.config
    }

    /// Starts processing inbound frames and watching heartbeats.
    ///
    /// Must be called from within a tokio runtime.
    pub fn listen(&self) -> Result<(), HubError> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.cancel.is_some() {
            return Err(HubError::AlreadyListening);
        }

        let hub = Arc::downgrade(&self.core);
        lifecycle
            .watcher
            .start(move |now| hub.upgrade().map_or(0, |hub| hub.evict_stale(now)))?;

        let cancel = CancellationToken::new();
        tokio::spawn(read_loop(
            Arc::clone(&self.core),
            Arc::clone(&self.mailbox),
            cancel.clone(),
        ));
        lifecycle.cancel = Some(cancel);

        tracing::info!(hub = %self.core.config.identity, "hub listening");
        Ok(())
    }

    /// Stops the read loop and the liveness watcher. Connections are kept.
    pub fn close(&self) -> Result<(), HubError> {
        let mut lifecycle = self.lifecycle.lock();
        let cancel = lifecycle.cancel.take().ok_or(HubError::NotListening)?;
        cancel.cancel();
        lifecycle.watcher.stop()?;
        tracing::info!(hub = %self.core.config.identity, "hub closed");
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.lifecycle.lock().cancel.is_some()
    }

    /// Subscribes to `message`, `connection`, `disconnected` or `event`.
    pub fn on<F>(&self, category: Category, listener: F) -> Result<(), HubError>
    where
        F: Fn(&HubEvent) + Send + Sync + 'static,
    {
        match category {
            Category::Message
            | Category::Connection
            | Category::Disconnected
            | Category::Event => {
                self.core.listeners.add(category, listener);
                Ok(())
            }
            Category::Connected => Err(HubError::UnsupportedCategory(category)),
        }
    }

    /// Subscribes to every envelope of one kind, reserved kinds included.
    ///
    /// A hand-built [`Kind::Custom`] holding a reserved name taps that
    /// reserved kind.
    pub fn on_kind<F>(&self, kind: impl Into<Kind>, listener: F) -> Result<(), HubError>
    where
        F: Fn(&Tap) + Send + Sync + 'static,
    {
        let kind = kind.into().canonical();
        if kind.as_str().is_empty() {
            return Err(ProtocolError::InvalidKind.into());
        }
        self.core.taps.add(kind, listener);
        Ok(())
    }

    /// Processes one inbound frame as the read loop would.
    pub fn dispatch(&self, inbound: Inbound) {
        self.core.dispatch(inbound);
    }

    /// Registers `peer` under its identity. See [`HubEvent::Connection`].
    ///
    /// A second registration of a live identity disconnects it with
    /// `already-connected` and returns `false`.
    pub fn register_connection(&self, peer: Peer) -> bool {
        self.core.register_connection(peer)
    }

    /// Notifies and removes a connection. Returns `false` if it was absent.
    pub fn disconnect(&self, id: &PeerId, reason: &str) -> bool {
        self.core.disconnect(id, reason)
    }

    pub fn send_to(&self, id: &PeerId, payload: impl Into<Payload>) -> Result<(), HubError> {
        self.core.send_to(id, payload)
    }

    /// Sends a request using the configured request timeout.
    pub fn request_to<F>(
        &self,
        id: &PeerId,
        payload: impl Into<Payload>,
        on_reply: F,
    ) -> Result<RequestId, HubError>
    where
        F: FnOnce(Result<Envelope, RequestError>) + Send + 'static,
    {
        self.core
            .request_to(id, payload, self.core.config.request_timeout, on_reply)
    }

    /// Sends a request with an explicit timeout (zero = wait forever).
    pub fn request_to_with_timeout<F>(
        &self,
        id: &PeerId,
        payload: impl Into<Payload>,
        timeout: Duration,
        on_reply: F,
    ) -> Result<RequestId, HubError>
    where
        F: FnOnce(Result<Envelope, RequestError>) + Send + 'static,
    {
        self.core.request_to(id, payload, timeout, on_reply)
    }

    /// Sends a request and waits for its outcome.
    pub async fn ask(&self, id: &PeerId, payload: impl Into<Payload>) -> Result<Envelope, HubError> {
        let correlator = self.core.correlator(id)?;
        Ok(correlator
            .ask(payload, self.core.config.request_timeout)
            .await?)
    }

    pub fn connection(&self, id: &PeerId) -> Option<ConnectionHandle> {
        self.core
            .registry
            .contains(id)
            .then(|| self.core.handle(id.clone()))
    }

    /// Connected identities, sorted.
    pub fn connections(&self) -> Vec<PeerId> {
        self.core.registry.identities()
    }
}

impl Drop for HubSession {
    fn drop(&mut self) {
        if let Some(cancel) = self.lifecycle.get_mut().cancel.take() {
            cancel.cancel();
        }
    }
}

async fn read_loop(core: Arc<HubCore>, mailbox: Arc<AsyncMutex<Mailbox>>, cancel: CancellationToken) {
    // Held for the loop's lifetime; a re-listen waits here for the old loop.
    let mut mailbox = mailbox.lock().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            inbound = mailbox.recv() => match inbound {
                Some(inbound) => core.dispatch(inbound),
                None => {
                    tracing::debug!("hub transport closed");
                    break;
                }
            },
        }
    }
    tracing::debug!("hub read loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tether_link::memory::{self, MemoryPort};
    use tether_link::{Reply, reply_channel};
    use tether_protocol::constants::ERR_MALFORMED;
    use tokio::sync::{mpsc, oneshot};

    const T: Duration = Duration::from_millis(100);

    fn config() -> HubConfig {
        HubConfig {
            heartbeat_interval: T,
            heartbeat_timeout: T,
            request_timeout: Duration::from_millis(300),
            ..HubConfig::default()
        }
    }

    fn listening_hub() -> (HubSession, MemoryPort) {
        let (port, mailbox) = memory::port("hub");
        let hub = HubSession::new(config(), mailbox).unwrap();
        hub.listen().unwrap();
        (hub, port)
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    fn record(hub: &HubSession, category: Category) -> mpsc::UnboundedReceiver<HubEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        hub.on(category, move |event| {
            let _ = tx.send(event.clone());
        })
        .unwrap();
        rx
    }

    struct Tab {
        id: PeerId,
        to_hub: Peer,
        mailbox: Mailbox,
    }

    impl Tab {
        fn new(hub: &MemoryPort, id: &str) -> Self {
            let (port, mailbox) = memory::port(id);
            Self {
                id: PeerId::from(id),
                to_hub: port.connect(hub),
                mailbox,
            }
        }

        async fn next(&mut self) -> Envelope {
            let inbound = self.mailbox.recv().await.expect("hub went away");
            match codec::decode(&inbound.data) {
                Decoded::Envelope(envelope) => envelope,
                other => panic!("unexpected frame: {other:?}"),
            }
        }

        async fn connect(&mut self) {
            self.to_hub.send(Envelope::new(Kind::Connect)).unwrap();
            assert_eq!(self.next().await.kind, Kind::Connected);
        }

        fn is_quiet(&mut self) -> bool {
            self.mailbox.try_recv().is_err()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_acknowledged_and_announced() {
        let (hub, port) = listening_hub();
        let mut connections = record(&hub, Category::Connection);
        let mut tab = Tab::new(&port, "tab-1");

        tab.connect().await;

        let Some(HubEvent::Connection(handle)) = connections.recv().await else {
            panic!("expected connection event");
        };
        assert_eq!(handle.id(), &tab.id);
        assert!(handle.is_connected());
        assert_eq!(hub.connections(), vec![tab.id.clone()]);
    }

    #[tokio::test(start_paused = true)]
    async fn message_before_connect_is_refused() {
        let (hub, port) = listening_hub();
        let mut messages = record(&hub, Category::Message);
        let mut tab = Tab::new(&port, "tab-1");

        tab.to_hub.send("hi").unwrap();

        let reply = tab.next().await;
        assert_eq!(reply, Envelope::error(ERR_NOT_CONNECTED));
        assert!(messages.try_recv().is_err());
        assert!(hub.connections().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn messages_reach_listeners_with_a_handle() {
        let (hub, port) = listening_hub();
        let mut messages = record(&hub, Category::Message);
        let mut tab = Tab::new(&port, "tab-1");
        tab.connect().await;

        tab.to_hub.send("hi").unwrap();

        let Some(HubEvent::Message { from, body, reply }) = messages.recv().await else {
            panic!("expected message event");
        };
        assert_eq!(body, Value::from("hi"));
        assert!(reply.is_none());

        from.send("hello back").unwrap();
        assert_eq!(tab.next().await, Envelope::message("hello back"));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_kinds_are_events() {
        let (hub, port) = listening_hub();
        let mut events = record(&hub, Category::Event);
        let mut tab = Tab::new(&port, "tab-1");
        tab.connect().await;

        let status = Envelope::with_body("status", &serde_json::json!({ "cpu": 12 })).unwrap();
        tab.to_hub.send(status.clone()).unwrap();

        let Some(HubEvent::Event { from, envelope, .. }) = events.recv().await else {
            panic!("expected generic event");
        };
        assert_eq!(from.id(), &tab.id);
        assert_eq!(envelope, status);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_connect_disconnects() {
        let (hub, port) = listening_hub();
        let mut gone = record(&hub, Category::Disconnected);
        let mut tab = Tab::new(&port, "tab-1");
        tab.connect().await;

        tab.to_hub.send(Envelope::new(Kind::Connect)).unwrap();

        assert_eq!(
            tab.next().await,
            Envelope::disconnected(REASON_ALREADY_CONNECTED)
        );
        let Some(HubEvent::Disconnected { id, reason }) = gone.recv().await else {
            panic!("expected disconnected event");
        };
        assert_eq!(id, tab.id);
        assert_eq!(reason, REASON_ALREADY_CONNECTED);
        assert!(hub.connection(&tab.id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_endpoint_is_evicted() {
        let (hub, port) = listening_hub();
        let mut gone = record(&hub, Category::Disconnected);
        let mut tab = Tab::new(&port, "tab-1");
        tab.connect().await;
        let connected_at = Instant::now();

        let notice = tab.next().await;

        assert_eq!(notice, Envelope::disconnected(REASON_HEARTBEAT_TIMEOUT));
        assert!(connected_at.elapsed() >= T);
        let Some(HubEvent::Disconnected { reason, .. }) = gone.recv().await else {
            panic!("expected disconnected event");
        };
        assert_eq!(reason, REASON_HEARTBEAT_TIMEOUT);
        assert!(hub.connections().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_is_announced_once() {
        let (hub, port) = listening_hub();
        let gone = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&gone);
        hub.on(Category::Disconnected, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let mut tab = Tab::new(&port, "tab-1");
        tab.connect().await;

        assert_eq!(
            tab.next().await,
            Envelope::disconnected(REASON_HEARTBEAT_TIMEOUT)
        );
        assert!(!hub.disconnect(&tab.id, "late"));
        tokio::time::advance(T * 3).await;
        settle().await;

        assert_eq!(gone.load(Ordering::SeqCst), 1);
        assert!(tab.is_quiet());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_keep_connection_alive() {
        let (hub, port) = listening_hub();
        let mut tab = Tab::new(&port, "tab-1");
        tab.connect().await;

        for _ in 0..10 {
            tokio::time::advance(T / 2).await;
            tab.to_hub.send(Envelope::new(Kind::Heartbeat)).unwrap();
            settle().await;
        }

        assert!(hub.connection(&tab.id).is_some());
        assert!(tab.is_quiet());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_from_stranger_is_ignored() {
        let (hub, port) = listening_hub();
        let mut tab = Tab::new(&port, "stranger");

        tab.to_hub.send(Envelope::new(Kind::Heartbeat)).unwrap();
        settle().await;

        assert!(hub.connections().is_empty());
        assert!(tab.is_quiet());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_idempotent() {
        let (hub, port) = listening_hub();
        let gone = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&gone);
        hub.on(Category::Disconnected, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let mut tab = Tab::new(&port, "tab-1");
        tab.connect().await;

        assert!(hub.disconnect(&tab.id, "bye"));
        assert!(!hub.disconnect(&tab.id, "bye"));
        assert!(!hub.disconnect(&PeerId::from("ghost"), "bye"));

        assert_eq!(tab.next().await, Envelope::disconnected("bye"));
        assert!(tab.is_quiet());
        assert_eq!(gone.load(Ordering::SeqCst), 1);
        assert!(hub.connections().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_tolerates_unreachable_peer() {
        let (hub, port) = listening_hub();
        let mut tab = Tab::new(&port, "tab-1");
        tab.connect().await;

        drop(tab.mailbox);
        assert!(hub.disconnect(&tab.id, "bye"));
        assert!(hub.connections().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn frames_from_own_identity_are_dropped() {
        let (hub, port) = listening_hub();
        let mut echo = Tab::new(&port, "hub");

        echo.to_hub.send(Envelope::new(Kind::Connect)).unwrap();
        echo.to_hub.send("hi").unwrap();
        settle().await;

        assert!(echo.is_quiet());
        assert!(hub.connections().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_traffic_is_ignored_and_garbage_reported() {
        let (hub, port) = listening_hub();
        let mut tab = Tab::new(&port, "tab-1");
        tab.connect().await;

        tab.to_hub
            .post(r#"{"type":"devtools","id":3}"#.to_owned(), None)
            .unwrap();
        settle().await;
        assert!(tab.is_quiet());

        tab.to_hub.post("{not json".to_owned(), None).unwrap();
        assert_eq!(tab.next().await, Envelope::error(ERR_MALFORMED));
        assert!(hub.connection(&tab.id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn listen_close_state_machine() {
        let (port, mailbox) = memory::port("hub");
        let hub = HubSession::new(config(), mailbox).unwrap();
        assert!(matches!(hub.close(), Err(HubError::NotListening)));

        hub.listen().unwrap();
        assert!(matches!(hub.listen(), Err(HubError::AlreadyListening)));
        hub.close().unwrap();
        assert!(!hub.is_listening());
        assert!(matches!(hub.close(), Err(HubError::NotListening)));

        // Frames queue while idle and are processed after a re-listen.
        let mut tab = Tab::new(&port, "tab-1");
        tab.to_hub.send(Envelope::new(Kind::Connect)).unwrap();
        settle().await;
        assert!(tab.is_quiet());

        hub.listen().unwrap();
        assert_eq!(tab.next().await.kind, Kind::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_hub_does_not_evict() {
        let (hub, port) = listening_hub();
        let mut tab = Tab::new(&port, "tab-1");
        tab.connect().await;
        hub.close().unwrap();

        tokio::time::advance(T * 5).await;
        settle().await;

        assert!(hub.connection(&tab.id).is_some());
        assert!(tab.is_quiet());
    }

    #[tokio::test(start_paused = true)]
    async fn shared_session_can_close_from_another_task() {
        let (port, mailbox) = memory::port("hub");
        let hub = Arc::new(HubSession::new(config(), mailbox).unwrap());
        hub.listen().unwrap();

        let closer = Arc::clone(&hub);
        tokio::spawn(async move { closer.close() })
            .await
            .unwrap()
            .unwrap();
        assert!(!hub.is_listening());

        let mut tab = Tab::new(&port, "tab-1");
        tab.to_hub.send(Envelope::new(Kind::Connect)).unwrap();
        settle().await;
        assert!(tab.is_quiet());

        hub.listen().unwrap();
        assert_eq!(tab.next().await.kind, Kind::Connected);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let (_port, mailbox) = memory::port("hub");
        let config = HubConfig {
            heartbeat_interval: Duration::ZERO,
            ..HubConfig::default()
        };
        assert!(matches!(
            HubSession::new(config, mailbox),
            Err(HubError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn unsupported_category_and_empty_kind_fail() {
        let (_port, mailbox) = memory::port("hub");
        let hub = HubSession::new(config(), mailbox).unwrap();

        assert!(matches!(
            hub.on(Category::Connected, |_| {}),
            Err(HubError::UnsupportedCategory(Category::Connected))
        ));
        assert!(matches!(
            hub.on_kind("", |_| {}),
            Err(HubError::Protocol(ProtocolError::InvalidKind))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn taps_see_reserved_kinds_before_routing() {
        let (hub, port) = listening_hub();
        let (tx, mut taps) = mpsc::unbounded_channel();
        hub.on_kind(Kind::Connect, move |tap| {
            let _ = tx.send(tap.from.clone());
        })
        .unwrap();
        let mut tab = Tab::new(&port, "tab-1");

        tab.connect().await;

        assert_eq!(taps.recv().await, Some(tab.id.clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn hand_built_reserved_kind_taps_the_reserved_kind() {
        let (hub, port) = listening_hub();
        let (tx, mut taps) = mpsc::unbounded_channel();
        hub.on_kind(Kind::Custom("connect".into()), move |tap| {
            let _ = tx.send(tap.envelope.kind.clone());
        })
        .unwrap();
        let mut tab = Tab::new(&port, "tab-1");

        tab.connect().await;

        assert_eq!(taps.recv().await, Some(Kind::Connect));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_listener_does_not_block_others() {
        let (hub, port) = listening_hub();
        hub.on(Category::Connection, |_| panic!("listener bug"))
            .unwrap();
        let mut connections = record(&hub, Category::Connection);
        let mut tab = Tab::new(&port, "tab-1");

        tab.connect().await;

        assert!(matches!(
            connections.recv().await,
            Some(HubEvent::Connection(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn send_to_unknown_connection_fails() {
        let (hub, _port) = listening_hub();
        let ghost = PeerId::from("ghost");

        assert!(matches!(
            hub.send_to(&ghost, "hello"),
            Err(HubError::UnknownConnection(id)) if id == ghost
        ));
        assert!(matches!(
            hub.request_to(&ghost, "hello", |_| {}),
            Err(HubError::UnknownConnection(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn handle_fails_after_disconnect() {
        let (hub, port) = listening_hub();
        let mut connections = record(&hub, Category::Connection);
        let mut tab = Tab::new(&port, "tab-1");
        tab.connect().await;
        let Some(HubEvent::Connection(handle)) = connections.recv().await else {
            panic!("expected connection event");
        };

        assert!(handle.disconnect("done"));
        assert!(!handle.is_connected());
        assert!(matches!(
            handle.send("still there?"),
            Err(HubError::UnknownConnection(_))
        ));

        drop(hub);
        assert!(!handle.disconnect("done"));
    }

    #[tokio::test(start_paused = true)]
    async fn request_to_endpoint_resolves_with_reply() {
        let (hub, port) = listening_hub();
        let mut tab = Tab::new(&port, "tab-1");
        tab.connect().await;

        let (tx, rx) = oneshot::channel();
        hub.request_to(&tab.id, Envelope::new("ping"), move |outcome| {
            let _ = tx.send(outcome);
        })
        .unwrap();

        let inbound = tab.mailbox.recv().await.unwrap();
        assert_eq!(
            codec::decode(&inbound.data),
            Decoded::Envelope(Envelope::new("ping"))
        );
        inbound.reply.unwrap().send(Envelope::new("pong")).unwrap();

        let reply = rx.await.unwrap().unwrap();
        assert_eq!(reply.kind, Kind::from("pong"));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out() {
        let (hub, port) = listening_hub();
        let mut tab = Tab::new(&port, "tab-1");
        tab.connect().await;

        let (tx, rx) = oneshot::channel();
        hub.request_to_with_timeout(&tab.id, "ping", Duration::from_millis(50), move |outcome| {
            let _ = tx.send(outcome);
        })
        .unwrap();

        assert!(matches!(
            rx.await.unwrap(),
            Err(RequestError::Timeout(d)) if d == Duration::from_millis(50)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn listener_answers_endpoint_request() {
        let (hub, port) = listening_hub();
        hub.on(Category::Event, |event| {
            if let HubEvent::Event {
                envelope,
                reply: Some(reply),
                ..
            } = event
            {
                let _ = reply.send(Envelope::with_body("echo", &envelope.body).unwrap());
            }
        })
        .unwrap();
        let mut tab = Tab::new(&port, "tab-1");
        tab.connect().await;

        let (reply_port, mut inbox) = reply_channel();
        let question = Envelope::with_body("echo", &"hello").unwrap();
        tab.to_hub
            .post(codec::encode(question.clone()).unwrap(), Some(reply_port))
            .unwrap();

        let Some(Reply::Text(text)) = inbox.recv().await else {
            panic!("expected text reply");
        };
        assert_eq!(codec::decode(&text), Decoded::Envelope(question));
    }
}
