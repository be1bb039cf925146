//! Fan-out publisher for normalized updates.
//!
//! Listeners are registered under a generated subscriber id.  Delivery
//! iterates the subscriber map in id order; a listener returning an error is
//! logged with its id and never prevents delivery to the remaining
//! listeners.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::warn;

use crate::error::ListenerError;
use crate::protocol::DiscreteEvent;
use crate::snapshot::SnapshotDelta;

/// What the pipeline publishes downstream: either the changed slice of the
/// snapshot for one tick, or a discrete named event passed through as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Delta(SnapshotDelta),
    Event(DiscreteEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type Listener = Box<dyn FnMut(&Update) -> Result<(), ListenerError> + Send>;

#[derive(Default)]
pub struct Sink {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    listeners: BTreeMap<SubscriberId, Listener>,
}

impl Sink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Listener) -> SubscriberId {
        let mut inner = self.inner.lock().unwrap();
        let id = SubscriberId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.insert(id, listener);
        id
    }

    /// Returns false if the id was not subscribed (already removed, or never
    /// issued by this sink).
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.lock().unwrap().listeners.remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().unwrap().listeners.len()
    }

    /// Delivers `update` to every listener.  Listener failures are logged
    /// and skipped; they never abort the pipeline.
    pub fn publish(&self, update: &Update) {
        let mut inner = self.inner.lock().unwrap();
        for (id, listener) in inner.listeners.iter_mut() {
            if let Err(err) = listener(update) {
                warn!(subscriber = %id, error = %err, "listener failed; continuing delivery");
            }
        }
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
