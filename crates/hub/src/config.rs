//! Hub configuration.

use std::time::Duration;

use tether_protocol::PeerId;
use tether_protocol::constants::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_HUB_IDENTITY,
    DEFAULT_REQUEST_TIMEOUT,
};

use crate::HubError;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// The hub's own transport identity. Frames claiming to come from it
    /// are dropped.
    pub identity: PeerId,
    /// How often the liveness watcher sweeps the registry.
    pub heartbeat_interval: Duration,
    /// Silence longer than this evicts a connection.
    pub heartbeat_timeout: Duration,
    /// Default timeout for requests sent to endpoints (zero = wait forever).
    pub request_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            identity: PeerId::from(DEFAULT_HUB_IDENTITY),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl HubConfig {
    /// Checks the heartbeat settings.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.heartbeat_interval.is_zero() {
            return Err(HubError::InvalidConfig("heartbeat interval must be non-zero"));
        }
        if self.heartbeat_timeout < self.heartbeat_interval {
            return Err(HubError::InvalidConfig(
                "heartbeat timeout must not be shorter than the interval",
            ));
        }
        Ok(())
    }
}
