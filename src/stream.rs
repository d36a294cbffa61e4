//! Publish/subscribe channel used for relay inbound traffic and for a
//! subscription's merged output.
//!
//! Every registration returns a handle that detaches the listener when it is
//! unsubscribed or dropped. Values are delivered in emission order, to
//! listeners in registration order. Nothing is buffered for listeners that
//! register after a value was emitted.
//!
//! # Example
//!
//! ```ignore
//! let stream = EventStream::new();
//! let receiver = stream.subscribe();
//!
//! stream.emit(&42);
//! assert_eq!(receiver.try_recv(), Ok(42));
//! ```

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::warn;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

enum Sink<T> {
    Callback(Callback<T>),
    Channel(Sender<T>),
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        match self {
            Sink::Callback(f) => Sink::Callback(Arc::clone(f)),
            Sink::Channel(tx) => Sink::Channel(tx.clone()),
        }
    }
}

struct Shared<T> {
    /// Registered listeners, ordered by registration.
    listeners: RwLock<BTreeMap<u64, Sink<T>>>,
    next_id: AtomicU64,
}

/// Type-erased detach hook held by [`Listener`].
trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T: Send + 'static> Detach for Shared<T> {
    fn detach(&self, id: u64) {
        self.listeners.write().remove(&id);
    }
}

/// A broadcast stream of `T` values with any number of listeners.
pub struct EventStream<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + 'static> EventStream<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                listeners: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register a callback invoked synchronously for every emitted value.
    #[must_use = "dropping the listener unsubscribes it"]
    pub fn subscribe_fn<F>(&self, callback: F) -> Listener
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(Sink::Callback(Arc::new(callback)))
    }

    /// Register an unbounded channel receiver.
    pub fn subscribe(&self) -> EventReceiver<T> {
        let (sender, receiver) = unbounded();
        let listener = self.register(Sink::Channel(sender));
        EventReceiver {
            receiver,
            _listener: listener,
        }
    }

    /// Register a bounded channel receiver. A receiver that falls `capacity`
    /// values behind is detached from the stream.
    pub fn subscribe_bounded(&self, capacity: usize) -> EventReceiver<T> {
        let (sender, receiver) = bounded(capacity);
        let listener = self.register(Sink::Channel(sender));
        EventReceiver {
            receiver,
            _listener: listener,
        }
    }

    fn register(&self, sink: Sink<T>) -> Listener {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        self.shared.listeners.write().insert(id, sink);

        let shared: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        let stream: Weak<dyn Detach> = shared;
        Listener { id, stream }
    }

    /// Deliver a value to every current listener.
    ///
    /// Callbacks run without the listener lock held, so they may register or
    /// unsubscribe listeners (including themselves).
    pub fn emit(&self, value: &T) {
        let sinks: Vec<(u64, Sink<T>)> = self
            .shared
            .listeners
            .read()
            .iter()
            .map(|(id, sink)| (*id, sink.clone()))
            .collect();

        let mut to_remove = Vec::new();
        for (id, sink) in sinks {
            match sink {
                Sink::Callback(callback) => callback(value),
                Sink::Channel(sender) => match sender.try_send(value.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(listener = id, "receiver buffer full, detaching slow listener");
                        to_remove.push(id);
                    }
                    Err(TrySendError::Disconnected(_)) => to_remove.push(id),
                },
            }
        }

        if !to_remove.is_empty() {
            let mut listeners = self.shared.listeners.write();
            for id in to_remove {
                listeners.remove(&id);
            }
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.read().len()
    }
}

impl<T: Clone + Send + 'static> Default for EventStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration handle. Unsubscribes on drop.
pub struct Listener {
    id: u64,
    stream: Weak<dyn Detach>,
}

impl Listener {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Detach from the stream now.
    pub fn unsubscribe(self) {
        drop(self)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.upgrade() {
            stream.detach(self.id);
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}

/// Channel-backed listener. Dropping it unsubscribes.
pub struct EventReceiver<T> {
    receiver: Receiver<T>,
    _listener: Listener,
}

impl<T> EventReceiver<T> {
    /// Receive the next value (blocking).
    pub fn recv(&self) -> Result<T, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a value (non-blocking).
    pub fn try_recv(&self) -> Result<T, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_delivery_in_emission_order() {
        let stream = EventStream::new();
        let receiver = stream.subscribe();

        for i in 0..5 {
            stream.emit(&i);
        }

        assert_eq!(receiver.drain(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_late_listener_misses_past_values() {
        let stream = EventStream::new();
        stream.emit(&1);

        let receiver = stream.subscribe();
        stream.emit(&2);

        assert_eq!(receiver.drain(), vec![2]);
    }

    #[test]
    fn test_unsubscribe_detaches_callback() {
        let stream = EventStream::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let listener = stream.subscribe_fn(move |v: &u32| sink.lock().push(*v));
        assert_eq!(stream.listener_count(), 1);

        stream.emit(&7);
        listener.unsubscribe();
        stream.emit(&8);

        assert_eq!(stream.listener_count(), 0);
        assert_eq!(*seen.lock(), vec![7]);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let stream = EventStream::new();
        let receiver = stream.subscribe();
        let _other = stream.subscribe();
        assert_eq!(stream.listener_count(), 2);

        drop(receiver);
        stream.emit(&1);
        assert_eq!(stream.listener_count(), 1);
    }

    #[test]
    fn test_slow_bounded_receiver_is_detached() {
        let stream = EventStream::new();
        let receiver = stream.subscribe_bounded(2);

        for i in 0..5 {
            stream.emit(&i);
        }

        assert_eq!(stream.listener_count(), 0);
        assert_eq!(receiver.drain(), vec![0, 1]);
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let stream: Arc<EventStream<u32>> = Arc::new(EventStream::new());
        let slot: Arc<Mutex<Option<Listener>>> = Arc::new(Mutex::new(None));

        let slot_in_callback = Arc::clone(&slot);
        let listener = stream.subscribe_fn(move |_| {
            slot_in_callback.lock().take();
        });
        *slot.lock() = Some(listener);

        stream.emit(&1);
        assert_eq!(stream.listener_count(), 0);
    }

    #[test]
    fn test_listener_outliving_stream() {
        let stream = EventStream::<u32>::new();
        let listener = stream.subscribe_fn(|_| {});
        drop(stream);
        listener.unsubscribe();
    }
}
