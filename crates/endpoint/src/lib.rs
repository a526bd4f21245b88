//! Endpoint side of a tether session.
//!
//! An [`EndpointSession`] talks to exactly one hub: it sends `connect` on
//! [`listen`](EndpointSession::listen), beats a heartbeat on a fixed period,
//! and dispatches what the hub sends back to listeners by category.

pub mod config;
mod heartbeat;
mod session;

pub use config::EndpointConfig;
pub use heartbeat::heartbeat_pump;
pub use session::{EndpointEvent, EndpointSession};

use tether_link::{LinkError, RequestError};
use tether_protocol::{Category, ProtocolError};

/// Errors produced by the endpoint.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("endpoint already listening")]
    AlreadyListening,

    #[error("endpoint not listening")]
    NotListening,

    #[error("listener category {0} is not available on an endpoint")]
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
