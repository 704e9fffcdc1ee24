//! Synchronous event emitter
//!
//! Listeners are registered per event name and invoked in-line, in
//! registration order, by `emit`. Nothing is queued: when `emit` returns every
//! listener has run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Callback type for event notifications
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by `on`, used to remove the listener again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry<E> {
    id: ListenerId,
    event: String,
    listener: Listener<E>,
}

/// Per-object listener table
pub struct EventEmitter<E> {
    entries: RwLock<Vec<Entry<E>>>,
    next_id: AtomicU64,
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener for `event`
    pub fn on<F>(&self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push(Entry {
            id,
            event: event.into(),
            listener: Arc::new(listener),
        });
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn off(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    pub fn has_listeners(&self, event: &str) -> bool {
        self.entries.read().iter().any(|entry| entry.event == event)
    }

    /// Invoke every listener registered for `event`.
    ///
    /// The listener table is snapshotted first, so listeners may register or
    /// remove listeners (or mutate the emitting object) while being called.
    pub fn emit(&self, event: &str, payload: &E) {
        let listeners: Vec<Listener<E>> = self
            .entries
            .read()
            .iter()
            .filter(|entry| entry.event == event)
            .map(|entry| Arc::clone(&entry.listener))
            .collect();

        if listeners.is_empty() {
            return;
        }
        tracing::trace!(event, listeners = listeners.len(), "emit");
        for listener in listeners {
            listener(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_reaches_matching_listeners_in_order() {
        let emitter: EventEmitter<u32> = EventEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = Arc::clone(&seen);
        emitter.on("tick", move |n| s1.lock().unwrap().push(("first", *n)));
        let s2 = Arc::clone(&seen);
        emitter.on("tick", move |n| s2.lock().unwrap().push(("second", *n)));
        let s3 = Arc::clone(&seen);
        emitter.on("other", move |n| s3.lock().unwrap().push(("other", *n)));

        emitter.emit("tick", &7);
        assert_eq!(*seen.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_off_removes_listener() {
        let emitter: EventEmitter<()> = EventEmitter::new();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        let id = emitter.on("ping", move |_| *c.lock().unwrap() += 1);

        emitter.emit("ping", &());
        assert!(emitter.off(id));
        assert!(!emitter.off(id));
        emitter.emit("ping", &());
        assert_eq!(*count.lock().unwrap(), 1);
        assert!(!emitter.has_listeners("ping"));
    }
}
