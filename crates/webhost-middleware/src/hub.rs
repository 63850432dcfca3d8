//! Observer registries with snapshot-then-call fan-out.
//!
//! The hub keeps two independent registries:
//!
//! | Registry | Observer trait | Events |
//! |---|---|---|
//! | state-control | [`StateObserver`] | lifecycle state changes |
//! | lifecycle | [`LifecycleObserver`] | URL changed, load finished, hidden, closure requested |
//!
//! Fan-out copies the registry under its lock, releases the lock, and only
//! then calls each observer. An observer may therefore register or
//! unregister observers from inside its own callback.
//!
//! Every fan-out is also published on a [`tokio::sync::broadcast`] channel
//! as a [`BrowserEvent`], so async consumers can follow the browser without
//! implementing an observer trait.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, trace};
use webhost_types::{BrowserEvent, EventPayload, LifecycleState, WebhostError};

/// Default broadcast capacity (events buffered before slow subscribers lag).
const DEFAULT_CAPACITY: usize = 256;

const SOURCE: &str = "webhost-middleware::hub";

// ---------------------------------------------------------------------------
// Observer traits
// ---------------------------------------------------------------------------

/// Receives lifecycle state changes confirmed by the engine loop.
pub trait StateObserver: Send + Sync {
    fn on_state_change(&self, state: LifecycleState);
}

/// Receives page and window events from the engine loop.
///
/// Every method has an empty default so observers only implement what they
/// need.
pub trait LifecycleObserver: Send + Sync {
    fn on_url_changed(&self, _url: &str) {}
    fn on_load_finished(&self, _url: &str) {}
    fn on_hidden(&self, _hidden: bool) {}
    fn on_closure_requested(&self) {}
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Identity-based observer list. An observer is the allocation behind its
/// `Arc`; clones of the same `Arc` are the same observer.
struct Registry<T: ?Sized> {
    observers: Mutex<Vec<Arc<T>>>,
}

impl<T: ?Sized> Registry<T> {
    fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
        }
    }

    fn register(&self, observer: Arc<T>) -> Result<(), WebhostError> {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        if observers.iter().any(|o| same(o, &observer)) {
            return Err(WebhostError::ObserverAlreadyRegistered);
        }
        observers.push(observer);
        Ok(())
    }

    fn unregister(&self, observer: &Arc<T>) -> Result<(), WebhostError> {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let index = observers
            .iter()
            .position(|o| same(o, observer))
            .ok_or(WebhostError::ObserverNotRegistered)?;
        observers.remove(index);
        Ok(())
    }

    fn snapshot(&self) -> Vec<Arc<T>> {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn len(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn same<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// ---------------------------------------------------------------------------
// NotificationHub
// ---------------------------------------------------------------------------

/// Fan-out point for every observer of the browser instance.
pub struct NotificationHub {
    state_observers: Registry<dyn StateObserver>,
    lifecycle_observers: Registry<dyn LifecycleObserver>,
    events: broadcast::Sender<BrowserEvent>,
}

impl NotificationHub {
    /// Create a hub whose broadcast stream buffers `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            state_observers: Registry::new(),
            lifecycle_observers: Registry::new(),
            events,
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a state observer.
    ///
    /// # Errors
    ///
    /// [`WebhostError::ObserverAlreadyRegistered`] if this observer is
    /// already registered.
    pub fn register_state_observer(
        &self,
        observer: Arc<dyn StateObserver>,
    ) -> Result<(), WebhostError> {
        self.state_observers.register(observer)?;
        debug!(count = self.state_observers.len(), "registered state observer");
        Ok(())
    }

    /// Unregister a state observer.
    ///
    /// # Errors
    ///
    /// [`WebhostError::ObserverNotRegistered`] if it was never registered.
    pub fn unregister_state_observer(
        &self,
        observer: &Arc<dyn StateObserver>,
    ) -> Result<(), WebhostError> {
        self.state_observers.unregister(observer)?;
        debug!(count = self.state_observers.len(), "unregistered state observer");
        Ok(())
    }

    /// Register a lifecycle observer.
    ///
    /// # Errors
    ///
    /// [`WebhostError::ObserverAlreadyRegistered`] if this observer is
    /// already registered.
    pub fn register_lifecycle_observer(
        &self,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Result<(), WebhostError> {
        self.lifecycle_observers.register(observer)?;
        debug!(count = self.lifecycle_observers.len(), "registered lifecycle observer");
        Ok(())
    }

    /// Unregister a lifecycle observer.
    ///
    /// # Errors
    ///
    /// [`WebhostError::ObserverNotRegistered`] if it was never registered.
    pub fn unregister_lifecycle_observer(
        &self,
        observer: &Arc<dyn LifecycleObserver>,
    ) -> Result<(), WebhostError> {
        self.lifecycle_observers.unregister(observer)?;
        debug!(count = self.lifecycle_observers.len(), "unregistered lifecycle observer");
        Ok(())
    }

    pub fn state_observer_count(&self) -> usize {
        self.state_observers.len()
    }

    pub fn lifecycle_observer_count(&self) -> usize {
        self.lifecycle_observers.len()
    }

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    pub fn notify_state_change(&self, state: LifecycleState) {
        for observer in self.state_observers.snapshot() {
            observer.on_state_change(state);
        }
        self.publish(EventPayload::StateChanged(state));
    }

    pub fn notify_url_changed(&self, url: &str) {
        for observer in self.lifecycle_observers.snapshot() {
            observer.on_url_changed(url);
        }
        self.publish(EventPayload::UrlChanged(url.to_string()));
    }

    pub fn notify_load_finished(&self, url: &str) {
        for observer in self.lifecycle_observers.snapshot() {
            observer.on_load_finished(url);
        }
        self.publish(EventPayload::LoadFinished(url.to_string()));
    }

    pub fn notify_hidden(&self, hidden: bool) {
        for observer in self.lifecycle_observers.snapshot() {
            observer.on_hidden(hidden);
        }
        self.publish(EventPayload::Hidden(hidden));
    }

    pub fn notify_closure_requested(&self) {
        for observer in self.lifecycle_observers.snapshot() {
            observer.on_closure_requested();
        }
        self.publish(EventPayload::ClosureRequested);
    }

    // -----------------------------------------------------------------------
    // Broadcast stream
    // -----------------------------------------------------------------------

    /// Subscribe to every event fanned out from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BrowserEvent> {
        self.events.subscribe()
    }

    fn publish(&self, payload: EventPayload) {
        // No subscribers is the normal case, not an error.
        if let Err(broadcast::error::SendError(event)) =
            self.events.send(BrowserEvent::new(SOURCE, payload))
        {
            trace!(payload = ?event.payload, "no broadcast subscribers");
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
