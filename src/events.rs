//! Named-event dispatcher decoupling protocol decoding from bot logic.
//!
//! [`EventDispatcher`] maps event names to ordered callback lists.
//! Publishing hands the event to a single fan-out worker task, so a slow
//! listener can never stall heartbeat or frame processing; within the
//! worker, callbacks for an event run synchronously in registration order
//! and events are delivered in arrival order.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tokio::sync::mpsc;

/// A registered event callback.
type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

type Registry = Arc<RwLock<HashMap<String, Vec<EventCallback>>>>;

/// Publish/subscribe registry for named gateway events.
///
/// Cloning yields a handle to the same registry and worker. Callbacks are
/// never removed implicitly; there is no wildcard subscription at this
/// layer. Events with no registered listeners are simply dropped.
#[derive(Clone)]
pub struct EventDispatcher {
    listeners: Registry,
    tx: mpsc::UnboundedSender<(String, Value)>,
}

impl EventDispatcher {
    /// Creates a dispatcher and spawns its fan-out worker.
    ///
    /// The worker exits once every handle to the dispatcher is dropped.
    #[must_use]
    pub fn new() -> Self {
        let listeners: Registry = Arc::new(RwLock::new(HashMap::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(fan_out(Arc::clone(&listeners), rx));
        Self { listeners, tx }
    }

    /// Registers a callback for an event name.
    ///
    /// Callbacks for the same name run in registration order.
    pub fn on(&self, event: impl Into<String>, callback: impl Fn(&Value) + Send + Sync + 'static) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.into())
            .or_default()
            .push(Arc::new(callback));
    }

    /// Publishes an event to its listeners via the fan-out worker.
    pub fn emit(&self, event: impl Into<String>, data: Value) {
        if self.tx.send((event.into(), data)).is_err() {
            tracing::trace!("event worker gone, dropping event");
        }
    }

    /// Number of callbacks registered for an event name.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("EventDispatcher")
            .field("events", &events)
            .finish()
    }
}

/// Worker loop delivering published events in arrival order.
async fn fan_out(listeners: Registry, mut rx: mpsc::UnboundedReceiver<(String, Value)>) {
    while let Some((event, data)) = rx.recv().await {
        // Snapshot under the lock, invoke without it, so a callback that
        // registers further listeners cannot deadlock.
        let callbacks = listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event)
            .cloned();
        let Some(callbacks) = callbacks else {
            continue;
        };
        for callback in &callbacks {
            callback(&data);
        }
    }
}
