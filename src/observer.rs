//! Observer Registry
//!
//! Maps subscription ids to frame callbacks and fans each frame out to every
//! subscriber. Dispatch copies the current callback set under a short lock
//! and invokes the copies outside it, so callbacks may add or remove
//! observers (including themselves) without deadlocking, and such changes
//! only affect later frames.
//!
//! A panicking callback is caught and logged; the remaining observers still
//! receive the frame.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::frame::Frame;

/// Frame callback shared between the registry and in-flight dispatches.
pub type FrameCallback = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Identifier returned by [`ObserverRegistry::add_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Reserved id returned when no callback was supplied.
    pub const INVALID: SubscriptionId = SubscriptionId(0);

    /// Raw id value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// False for [`SubscriptionId::INVALID`].
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription id to callback map with snapshot fan-out.
pub struct ObserverRegistry {
    observers: Mutex<HashMap<SubscriptionId, FrameCallback>>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback. `None` registers nothing and returns
    /// [`SubscriptionId::INVALID`].
    pub fn add_observer(&self, callback: Option<FrameCallback>) -> SubscriptionId {
        let Some(callback) = callback else {
            return SubscriptionId::INVALID;
        };
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().insert(id, callback);
        debug!(subscription = %id, "Observer added");
        id
    }

    /// Register a closure.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.add_observer(Some(Arc::new(callback)))
    }

    /// Remove one observer. Returns false if the id was not registered.
    pub fn remove_observer(&self, id: SubscriptionId) -> bool {
        let removed = self.observers.lock().remove(&id).is_some();
        if removed {
            debug!(subscription = %id, "Observer removed");
        }
        removed
    }

    /// Remove every observer.
    pub fn clear_observers(&self) {
        self.observers.lock().clear();
        debug!("Observers cleared");
    }

    /// Replace every observer with a single callback (or none).
    pub fn on_grabbed(&self, callback: Option<FrameCallback>) -> SubscriptionId {
        let mut observers = self.observers.lock();
        observers.clear();
        let Some(callback) = callback else {
            return SubscriptionId::INVALID;
        };
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        observers.insert(id, callback);
        id
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    /// Whether no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.observers.lock().is_empty()
    }

    /// Deliver a frame to a snapshot of the current observers.
    pub fn dispatch(&self, frame: &Frame) {
        let snapshot: Vec<(SubscriptionId, FrameCallback)> = self
            .observers
            .lock()
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();

        trace!(sequence = frame.sequence(), observers = snapshot.len(), "Dispatching frame");

        for (id, callback) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(frame))).is_err() {
                error!(
                    subscription = %id,
                    sequence = frame.sequence(),
                    "Frame observer panicked"
                );
            }
        }
    }

    /// Subscribe a bounded async channel.
    ///
    /// Frames are pushed with `try_send`; when the receiver lags the frame is
    /// dropped and counted. Dropping the stream removes the observer.
    pub fn frame_stream(self: &Arc<Self>, capacity: usize) -> FrameStream {
        let (tx, receiver) = mpsc::channel(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&dropped);

        let id = self.subscribe(move |frame| {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(frame.clone()) {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        });

        FrameStream {
            receiver,
            dropped,
            registry: Arc::downgrade(self),
            id,
        }
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Async receiver of frames, detached from the registry on drop.
pub struct FrameStream {
    receiver: mpsc::Receiver<Frame>,
    dropped: Arc<AtomicU64>,
    registry: Weak<ObserverRegistry>,
    id: SubscriptionId,
}

impl FrameStream {
    /// Next frame, or `None` once the stream has been detached.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }

    /// Next frame if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.receiver.try_recv().ok()
    }

    /// Frames discarded because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Id of the observer feeding this stream.
    pub fn subscription_id(&self) -> SubscriptionId {
        self.id
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_observer(self.id);
        }
    }
}
