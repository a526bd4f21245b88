//! Transport seam for tether sessions.
//!
//! The protocol only needs three things from a transport: address a peer and
//! hand it a string, deliver `(data, sender)` pairs asynchronously, and open
//! a single-use reply path alongside one outgoing message. [`Link`],
//! [`Inbound`] and [`ReplyPort`] are those three things. On top of them sits
//! the [`Correlator`], which pairs a request with exactly one reply outcome.
//!
//! [`memory`] is an in-process transport used by tests and the demo.

mod error;
mod link;
pub mod memory;
mod reply;
mod request;

pub use error::{LinkError, RequestError};
pub use link::{Inbound, Link, Mailbox, Peer};
pub use reply::{Reply, ReplyInbox, ReplyPort, reply_channel};
pub use request::{Correlator, RequestId};
