//! Endpoint configuration.

use std::time::Duration;

use tether_protocol::constants::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_REQUEST_TIMEOUT};

use crate::EndpointError;

/// Endpoint configuration.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Period of the heartbeat pump. Must not exceed the hub's timeout.
    pub heartbeat_interval: Duration,
    /// Default timeout for requests sent to the hub (zero = wait forever).
    pub request_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl EndpointConfig {
    pub fn validate(&self) -> Result<(), EndpointError> {
        if self.heartbeat_interval.is_zero() {
            return Err(EndpointError::InvalidConfig(
                "heartbeat interval must be non-zero",
            ));
        }
        Ok(())
    }
}
