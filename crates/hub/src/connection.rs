//! Handle to one connected endpoint, passed to hub listeners.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tether_link::{RequestError, RequestId};
use tether_protocol::{Envelope, Payload, PeerId};

use crate::HubError;
use crate::session::HubCore;

/// Addresses a connection by identity.
///
/// The handle does not keep the hub alive. Once the connection is gone,
/// every operation fails with [`HubError::UnknownConnection`].
#[derive(Clone)]
pub struct ConnectionHandle {
    id: PeerId,
    hub: Weak<HubCore>,
}

impl ConnectionHandle {
    pub(crate) fn new(id: PeerId, hub: &Arc<HubCore>) -> Self {
        Self {
            id,
            hub: Arc::downgrade(hub),
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    fn hub(&self) -> Result<Arc<HubCore>, HubError> {
        self.hub
            .upgrade()
            .ok_or_else(|| HubError::UnknownConnection(self.id.clone()))
    }

    pub fn is_connected(&self) -> bool {
        self.hub
            .upgrade()
            .is_some_and(|hub| hub.registry.contains(&self.id))
    }

    /// Sends a payload to the endpoint without expecting a reply.
    pub fn send(&self, payload: impl Into<Payload>) -> Result<(), HubError> {
        self.hub()?.send_to(&self.id, payload)
    }

    /// Sends a request using the hub's default request timeout.
    pub fn request<F>(&self, payload: impl Into<Payload>, on_reply: F) -> Result<RequestId, HubError>
    where
        F: FnOnce(Result<Envelope, RequestError>) + Send + 'static,
    {
        let hub = self.hub()?;
        let timeout = hub.config.request_timeout;
        hub.request_to(&self.id, payload, timeout, on_reply)
    }

    /// Sends a request with an explicit timeout (zero = wait forever).
    pub fn request_with_timeout<F>(
        &self,
        payload: impl Into<Payload>,
        timeout: Duration,
        on_reply: F,
    ) -> Result<RequestId, HubError>
    where
        F: FnOnce(Result<Envelope, RequestError>) + Send + 'static,
    {
        self.hub()?.request_to(&self.id, payload, timeout, on_reply)
    }

    /// Sends a request and waits for its outcome.
    pub async fn ask(&self, payload: impl Into<Payload>) -> Result<Envelope, HubError> {
        let (correlator, timeout) = {
            let hub = self.hub()?;
            (hub.correlator(&self.id)?, hub.config.request_timeout)
        };
        Ok(correlator.ask(payload, timeout).await?)
    }

    /// Disconnects the endpoint. Returns `false` if it was already gone.
    pub fn disconnect(&self, reason: &str) -> bool {
        self.hub
            .upgrade()
            .is_some_and(|hub| hub.disconnect(&self.id, reason))
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
