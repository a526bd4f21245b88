//! Listener registry shared by both session roles.
//!
//! Listeners are kept per key in subscription order and invoked in that
//! order. Lists only grow. A panicking listener is logged and skipped so the
//! rest of the dispatch still runs.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ProtocolError;

/// Event category a session listener subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Application `message` bodies.
    Message,
    /// Hub side: a new endpoint completed the handshake.
    Connection,
    /// Endpoint side: the hub acknowledged the handshake.
    Connected,
    /// A connection ended (hub: any endpoint; endpoint: itself).
    Disconnected,
    /// Every other kind, including application-defined ones.
    Event,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Message => "message",
            Category::Connection => "connection",
            Category::Connected => "connected",
            Category::Disconnected => "disconnected",
            Category::Event => "event",
        }
    }
}

impl FromStr for Category {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(Category::Message),
            "connection" => Ok(Category::Connection),
            "connected" => Ok(Category::Connected),
            "disconnected" => Ok(Category::Disconnected),
            "event" => Ok(Category::Event),
            other => Err(ProtocolError::UnknownCategory(other.to_owned())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered callback.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Ordered callback lists keyed by `K`, receiving `&E`.
pub struct ListenerSet<K, E> {
    lists: RwLock<HashMap<K, Vec<Listener<E>>>>,
}

impl<K, E> ListenerSet<K, E>
where
    K: Eq + Hash + fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            lists: RwLock::new(HashMap::new()),
        }
    }

    /// Appends a listener under `key`.
    pub fn add<F>(&self, key: K, listener: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.lists
            .write()
            .entry(key)
            .or_default()
            .push(Arc::new(listener));
    }

    /// Invokes every listener under `key` in subscription order.
    ///
    /// The list is snapshotted first, so listeners may subscribe further
    /// listeners without deadlocking; those run from the next dispatch on.
    /// Returns how many listeners completed without panicking.
    pub fn emit(&self, key: &K, event: &E) -> usize {
        let snapshot = match self.lists.read().get(key) {
            Some(list) => list.clone(),
            None => return 0,
        };

        let mut completed = 0;
        for (index, listener) in snapshot.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => completed += 1,
                Err(panic) => {
                    let message = if let Some(s) = panic.downcast_ref::<&str>() {
                        (*s).to_owned()
                    } else if let Some(s) = panic.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "non-string panic payload".to_owned()
                    };
                    tracing::error!(key = ?key, index, "listener panicked: {message}");
                }
            }
        }
        completed
    }

    /// Number of listeners registered under `key`.
    pub fn len(&self, key: &K) -> usize {
        self.lists.read().get(key).map_or(0, Vec::len)
    }

    /// Returns `true` if nothing is registered under `key`.
    pub fn is_empty(&self, key: &K) -> bool {
        self.len(key) == 0
    }
}

impl<K, E> Default for ListenerSet<K, E>
where
    K: Eq + Hash + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}
