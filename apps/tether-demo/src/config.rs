//! Demo configuration.
//!
//! Read from the TOML file named by the first command-line argument. Every
//! field is optional; without a file the defaults are used.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_endpoint::EndpointConfig;
use tether_hub::HubConfig;
use tether_protocol::PeerId;
use tether_protocol::constants::DEFAULT_HUB_IDENTITY;

/// Demo configuration. Durations are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Transport identity of the hub.
    #[serde(default = "default_hub_identity")]
    pub hub_identity: String,

    /// Number of endpoints to start.
    #[serde(default = "default_endpoints")]
    pub endpoints: usize,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Silence tolerated by the hub before eviction.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Seconds to run before shutting down (0 = until Ctrl-C).
    #[serde(default = "default_run_for_secs")]
    pub run_for_secs: u64,
}

fn default_hub_identity() -> String {
    DEFAULT_HUB_IDENTITY.into()
}

fn default_endpoints() -> usize {
    3
}

fn default_heartbeat_interval_ms() -> u64 {
    1000
}

fn default_heartbeat_timeout_ms() -> u64 {
    3000
}

fn default_request_timeout_ms() -> u64 {
    3000
}

fn default_run_for_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hub_identity: default_hub_identity(),
            endpoints: default_endpoints(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            run_for_secs: default_run_for_secs(),
        }
    }
}

impl Config {
    /// Loads the configuration file, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration read");
        Ok(config)
    }

    pub fn hub(&self) -> HubConfig {
        HubConfig {
            identity: PeerId::new(self.hub_identity.clone()),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(self.heartbeat_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    pub fn endpoint(&self) -> EndpointConfig {
        EndpointConfig {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    /// `None` means run until interrupted.
    pub fn run_for(&self) -> Option<Duration> {
        (self.run_for_secs > 0).then(|| Duration::from_secs(self.run_for_secs))
    }
}
