//! Hub side of a tether session.
//!
//! A [`HubSession`] accepts `connect` handshakes from many endpoints,
//! keeps them in a connection registry, evicts the ones that stop sending
//! heartbeats, and dispatches everything else to listeners by category.

pub mod config;
mod connection;
mod registry;
mod session;
mod watcher;

pub use config::HubConfig;
pub use connection::ConnectionHandle;
pub use registry::{Connection, ConnectionRegistry};
pub use session::{HubEvent, HubSession, Tap};
pub use watcher::LivenessWatcher;

use tether_link::{LinkError, RequestError};
use tether_protocol::{Category, PeerId, ProtocolError};

/// Errors produced by the hub.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("hub already listening")]
    AlreadyListening,

    #[error("hub not listening")]
    NotListening,

    #[error("liveness watcher already running")]
    WatcherAlreadyRunning,

    #[error("liveness watcher not running")]
    WatcherNotRunning,

    #[error("unknown connection: {0}")]
    UnknownConnection(PeerId),

    #[error("listener category {0} is not available on the hub")]
    UnsupportedCategory(Category),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Request(#[from] RequestError),
}
