use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Key stamped on every protocol frame. Frames without it (or with any
/// value other than `true`) belong to someone else on the same transport.
pub const PROTOCOL_MARKER: &str = "tether";

/// How often endpoints beat and the hub sweeps for silent connections.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);

/// How long a connection may stay silent before the hub evicts it.
///
/// Equal to the interval, so a single missed beat is enough. Raise it to a
/// multiple of the interval to tolerate scheduling jitter.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Timeout for request/reply operations.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(3000);

/// Maximum frame size in bytes (16 MB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Identity the hub answers to unless configured otherwise.
pub const DEFAULT_HUB_IDENTITY: &str = "hub";

// ---------------------------------------------------------------------------
// Disconnect reasons
// ---------------------------------------------------------------------------

/// A second `connect` arrived from an identity that is already connected.
pub const REASON_ALREADY_CONNECTED: &str = "already-connected";
/// The liveness watcher saw no heartbeat within the timeout window.
pub const REASON_HEARTBEAT_TIMEOUT: &str = "heartbeat-timeout";
/// Reason used when the caller does not give one.
pub const REASON_UNKNOWN: &str = "unknown";

// ---------------------------------------------------------------------------
// Error bodies
// ---------------------------------------------------------------------------

pub const ERR_NOT_CONNECTED: &str = "not-connected";
pub const ERR_MALFORMED: &str = "malformed-message";
pub const ERR_MISSING_KIND: &str = "missing-kind";
pub const ERR_TOO_LARGE: &str = "message-too-large";

/// Envelope kind.
///
/// The six reserved kinds drive the session protocol. Anything else is an
/// application-defined event and is routed to generic listeners.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Kind {
    Connect,
    Connected,
    Disconnected,
    Heartbeat,
    Message,
    Error,
    /// Application-defined kind.
    ///
    /// Build kinds through `From`, which maps reserved names to their
    /// variants. A hand-built `Custom` holding a reserved name goes on the
    /// wire as that reserved kind; [`Kind::canonical`] normalises it.
    Custom(String),
}

impl Kind {
    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Kind::Connect => "connect",
            Kind::Connected => "connected",
            Kind::Disconnected => "disconnected",
            Kind::Heartbeat => "heartbeat",
            Kind::Message => "message",
            Kind::Error => "error",
            Kind::Custom(name) => name,
        }
    }

    /// Returns `true` for the kinds the protocol itself interprets.
    pub fn is_reserved(&self) -> bool {
        match self {
            Kind::Custom(name) => !matches!(Kind::from(name.as_str()), Kind::Custom(_)),
            _ => true,
        }
    }

    /// Maps a `Custom` holding a reserved name to the reserved variant.
    pub fn canonical(self) -> Kind {
        match self {
            Kind::Custom(name) => Kind::from(name),
            other => other,
        }
    }
}

impl From<String> for Kind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "connect" => Kind::Connect,
            "connected" => Kind::Connected,
            "disconnected" => Kind::Disconnected,
            "heartbeat" => Kind::Heartbeat,
            "message" => Kind::Message,
            "error" => Kind::Error,
            _ => Kind::Custom(name),
        }
    }
}

impl From<&str> for Kind {
    fn from(name: &str) -> Self {
        Kind::from(name.to_owned())
    }
}

impl From<Kind> for String {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Custom(name) => name,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
