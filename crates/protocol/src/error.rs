//! Error types for the wire protocol.

/// Errors produced by the codec and the listener registry.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown listener category: {0:?}")]
    UnknownCategory(String),

    #[error("event kind must not be empty")]
    InvalidKind,
}
