use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::Kind;

/// The unit on the wire, minus the protocol marker.
///
/// The marker is added and stripped by [`crate::codec`], so an `Envelope`
/// in hand is always one of ours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,
}

impl Envelope {
    /// Creates an envelope with no body.
    pub fn new(kind: impl Into<Kind>) -> Self {
        Self {
            kind: kind.into(),
            body: Value::Null,
        }
    }

    /// Creates an envelope carrying a serialized body.
    pub fn with_body<T: Serialize>(
        kind: impl Into<Kind>,
        body: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: kind.into(),
            body: serde_json::to_value(body)?,
        })
    }

    /// Creates an application `message` envelope.
    pub fn message(body: impl Into<Value>) -> Self {
        Self {
            kind: Kind::Message,
            body: body.into(),
        }
    }

    /// Creates an `error` envelope.
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            kind: Kind::Error,
            body: Value::String(reason.into()),
        }
    }

    /// Creates a `disconnected` envelope carrying the reason.
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self {
            kind: Kind::Disconnected,
            body: Value::String(reason.into()),
        }
    }

    /// Deserializes the body into the given type.
    pub fn body_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }

    /// Returns the body as a string slice, if it is one.
    pub fn body_str(&self) -> Option<&str> {
        self.body.as_str()
    }
}

/// Anything that can be handed to the codec for sending.
///
/// A bare string becomes a `message` envelope; an [`Envelope`] is sent as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Envelope(Envelope),
}

impl Payload {
    /// Returns the kind this payload will carry on the wire.
    pub fn kind(&self) -> &Kind {
        match self {
            Payload::Text(_) => &Kind::Message,
            Payload::Envelope(envelope) => &envelope.kind,
        }
    }

    /// Resolves the payload into the envelope that goes on the wire.
    pub fn into_envelope(self) -> Envelope {
        match self {
            Payload::Text(text) => Envelope::message(text),
            Payload::Envelope(envelope) => envelope,
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_owned())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Envelope> for Payload {
    fn from(envelope: Envelope) -> Self {
        Payload::Envelope(envelope)
    }
}
