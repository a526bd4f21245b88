//! Wire protocol for tether hub/endpoint sessions.
//!
//! Everything here is transport-agnostic: the envelope shape, the codec that
//! tells protocol frames apart from foreign traffic, the reserved kinds and
//! reason strings, and the listener registry both session roles dispatch
//! through.

pub mod codec;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod listener;
pub mod types;

// Re-export primary types for convenience.
pub use codec::{Decoded, Malformed, decode, encode};
pub use constants::Kind;
pub use envelope::{Envelope, Payload};
pub use error::ProtocolError;
pub use listener::{Category, ListenerSet};
pub use types::PeerId;
