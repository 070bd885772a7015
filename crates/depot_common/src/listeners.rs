//! Subscription registry for typed events
//!
//! Listeners are stored as `(id, topic, callback)` entries and removed by id.
//! Every invocation runs under `catch_unwind`, so one failing listener never
//! blocks delivery to the others.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Topic that matches every event
pub const ANY_TOPIC: &str = "*";

/// Events carry the topic name listeners subscribe to
pub trait Topic {
    fn topic(&self) -> &str;
}

/// Handle returned by [`ListenerRegistry::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Entry<E> {
    id: SubscriptionId,
    topic: String,
    listener: Listener<E>,
}

pub struct ListenerRegistry<E> {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry<E>>>,
}

impl<E: Topic> ListenerRegistry<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register `listener` for events whose topic equals `topic` (or all
    /// events when `topic` is [`ANY_TOPIC`]).
    pub fn subscribe<F>(&self, topic: impl Into<String>, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Entry {
            id,
            topic: topic.into(),
            listener: Arc::new(listener),
        });
        id
    }

    /// Returns false when the id was unknown (already removed).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Deliver `event` to every matching listener and return how many
    /// returned normally.
    pub fn emit(&self, event: &E) -> usize {
        let topic = event.topic();

        // Snapshot so listeners may (un)subscribe from inside a callback.
        let targets: Vec<Listener<E>> = self
            .lock()
            .iter()
            .filter(|entry| entry.topic == topic || entry.topic == ANY_TOPIC)
            .map(|entry| Arc::clone(&entry.listener))
            .collect();

        let mut delivered = 0;
        for listener in targets {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::error!("Listener for '{}' panicked; continuing delivery", topic),
            }
        }
        delivered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Entry<E>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: Topic> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
