//! Error types for the transport seam.

use std::time::Duration;

use serde_json::Value;
use tether_protocol::ProtocolError;

/// Errors from handing a message to the transport.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("peer unreachable: link closed")]
    Closed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Outcome errors delivered to a request's reply callback.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("reply timed out after {0:?}")]
    Timeout(Duration),

    #[error("reply data invalid: {0}")]
    InvalidReply(String),

    #[error("remote error: {0}")]
    Remote(Value),

    #[error(transparent)]
    Link(#[from] LinkError),
}

impl From<ProtocolError> for RequestError {
    fn from(err: ProtocolError) -> Self {
        RequestError::Link(LinkError::Protocol(err))
    }
}
