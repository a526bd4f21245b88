//! Envelope codec.
//!
//! Turns envelopes into marker-tagged JSON text and back. Decoding keeps
//! two failure modes apart: text that is not even JSON (or not a usable
//! envelope) is [`Decoded::Malformed`] and worth a warning, while valid JSON
//! without the marker is [`Decoded::NotOurs`] and must be ignored silently,
//! since other code may share the same transport.

use serde_json::{Map, Value};

use crate::constants::{
    ERR_MALFORMED, ERR_MISSING_KIND, ERR_TOO_LARGE, Kind, MAX_FRAME_SIZE, PROTOCOL_MARKER,
};
use crate::envelope::{Envelope, Payload};
use crate::error::ProtocolError;

/// Result of decoding one transport message.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A protocol envelope, marker stripped.
    Envelope(Envelope),
    /// Structurally valid, but not a protocol frame.
    NotOurs,
    /// Claimed or attempted to be a frame, but unusable.
    Malformed(Malformed),
}

/// Why a frame could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    /// Not parseable as JSON.
    Syntax,
    /// Marked as ours but without a string `kind`.
    MissingKind,
    /// Larger than [`MAX_FRAME_SIZE`]; not parsed at all.
    Oversized,
}

impl Malformed {
    /// Error body sent back to the peer.
    pub fn as_str(&self) -> &'static str {
        match self {
            Malformed::Syntax => ERR_MALFORMED,
            Malformed::MissingKind => ERR_MISSING_KIND,
            Malformed::Oversized => ERR_TOO_LARGE,
        }
    }
}

/// Serializes a payload into wire text, stamping the protocol marker.
///
/// An empty kind fails with [`ProtocolError::InvalidKind`]; the far side
/// would reject the frame as `missing-kind`.
pub fn encode(payload: impl Into<Payload>) -> Result<String, ProtocolError> {
    let envelope = payload.into().into_envelope();
    if envelope.kind.as_str().is_empty() {
        return Err(ProtocolError::InvalidKind);
    }

    let mut frame = Map::new();
    frame.insert("kind".into(), Value::String(envelope.kind.into()));
    if !envelope.body.is_null() {
        frame.insert("body".into(), envelope.body);
    }
    frame.insert(PROTOCOL_MARKER.into(), Value::Bool(true));

    Ok(serde_json::to_string(&frame)?)
}

/// Parses wire text into an envelope.
pub fn decode(text: &str) -> Decoded {
    if text.len() > MAX_FRAME_SIZE {
        return Decoded::Malformed(Malformed::Oversized);
    }

    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return Decoded::Malformed(Malformed::Syntax),
    };

    let Value::Object(mut frame) = value else {
        return Decoded::NotOurs;
    };
    if frame.remove(PROTOCOL_MARKER) != Some(Value::Bool(true)) {
        return Decoded::NotOurs;
    }

    let kind = match frame.remove("kind") {
        Some(Value::String(name)) if !name.is_empty() => Kind::from(name),
        _ => return Decoded::Malformed(Malformed::MissingKind),
    };
    let body = frame.remove("body").unwrap_or(Value::Null);

    Decoded::Envelope(Envelope { kind, body })
}
