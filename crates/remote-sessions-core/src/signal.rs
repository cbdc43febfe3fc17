//! Publish/subscribe signal with synchronous listeners and async streams.

use std::sync::{
    Arc, Mutex, PoisonError, Weak,
    atomic::{AtomicU64, Ordering},
};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Capacity of the broadcast side; lagging stream consumers skip messages.
const STREAM_CAPACITY: usize = 1024;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slots<T> {
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    next_id: AtomicU64,
}

impl<T> Slots<T> {
    fn remove(&self, id: u64) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(slot, _)| *slot != id);
    }
}

/// Signal delivering each emitted value to its current subscribers.
///
/// Listeners run inline, in connection order, on the emitting task.
/// A listener connected or disconnected during an emission does not
/// affect that emission. Stream subscribers only see values emitted
/// after they subscribed.
pub struct Signal<T> {
    slots: Arc<Slots<T>>,
    sender: broadcast::Sender<T>,
}

impl<T: Clone + Send + 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Signal<T> {
    /// Create a signal with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            slots: Arc::new(Slots {
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
            sender,
        }
    }

    /// Register a listener.
    ///
    /// The listener stays connected until the returned handle is
    /// dropped or disconnected.
    #[must_use = "dropping the subscription disconnects the listener"]
    pub fn connect<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.slots.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));

        let weak: Weak<Slots<T>> = Arc::downgrade(&self.slots);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(slots) = weak.upgrade() {
                    slots.remove(id);
                }
            })),
        }
    }

    /// Deliver `value` to every listener, then to stream subscribers.
    pub fn emit(&self, value: T) {
        let snapshot: Vec<Listener<T>> = self
            .slots
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(&value);
        }
        let _ = self.sender.send(value); // no stream subscribers is fine
    }

    /// Number of connected listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.slots
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Get a receiver for values emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Stream of values emitted from now on.
    #[must_use]
    pub fn stream(&self) -> futures::stream::BoxStream<'static, T> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|res| async move { res.ok() })
            .boxed()
    }
}

/// Handle keeping a listener connected to a [`Signal`].
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Disconnect the listener now.
    pub fn disconnect(mut self) {
        self.run_detach();
    }

    fn run_detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("connected", &self.detach.is_some())
            .finish()
    }
}
