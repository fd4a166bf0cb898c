use crate::Subscription;
use futures_signals::signal::{Mutable, MutableSignalCloned, SignalExt, SignalStream};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Identity of a registered listener.
///
/// Removal is by id rather than by closure, so two listeners that look the
/// same can never be confused with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;
type DisposeCallback = Box<dyn FnOnce() + Send>;

/// The part of an observable a dependent needs: change notifications and
/// lifecycle, without the value.
pub trait ChangeNotifier: Send + Sync {
    fn add_change_listener(&self, listener: Arc<dyn Fn() + Send + Sync>) -> ListenerId;

    fn remove_listener(&self, id: ListenerId) -> bool;

    fn on_dispose(&self, callback: Box<dyn FnOnce() + Send>);
}

struct Registry<T> {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener<T>)>,
    dispose_callbacks: Vec<DisposeCallback>,
    disposed: bool,
    /// Stored values not yet delivered, oldest first.
    pending: VecDeque<T>,
    delivering: bool,
}

/// Marks a delivery round in progress. Dropped without `finish` only when a
/// listener panicked, in which case the next `set` delivers again.
struct Delivery<'a, T> {
    registry: &'a Mutex<Registry<T>>,
    finished: bool,
}

impl<T> Drop for Delivery<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            lock(self.registry).delivering = false;
        }
    }
}

fn lock<U>(mutex: &Mutex<U>) -> MutexGuard<'_, U> {
    // A panicking listener must not wedge every later notification.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ObservableInner<T> {
    value: Mutable<T>,
    registry: Mutex<Registry<T>>,
}

/// A single value that notifies registered listeners synchronously whenever
/// it is replaced.
///
/// Handles are cheap to clone and share the same value and listener set.
pub struct ObservableValue<T> {
    inner: Arc<ObservableInner<T>>,
}

impl<T> Clone for ObservableValue<T> {
    fn clone(&self) -> Self {
        ObservableValue {
            inner: self.inner.clone(),
        }
    }
}

impl<T> ObservableValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(initial_value: T) -> Self {
        ObservableValue {
            inner: Arc::new(ObservableInner {
                value: Mutable::new(initial_value),
                registry: Mutex::new(Registry {
                    next_id: 0,
                    listeners: Vec::new(),
                    dispose_callbacks: Vec::new(),
                    disposed: false,
                    pending: VecDeque::new(),
                    delivering: false,
                }),
            }),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry<T>> {
        lock(&self.inner.registry)
    }

    pub fn get(&self) -> T {
        self.inner.value.get_cloned()
    }

    /// Reads the value in place. `f` must not replace the value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.lock_ref())
    }

    /// Replaces the value and invokes every listener registered at the time
    /// the value is delivered, in registration order.
    ///
    /// Listeners see values in the order they were stored. A `set` made while
    /// another delivery is running, from a listener or from another thread,
    /// is queued and delivered by that running round once it finishes the
    /// current value.
    ///
    /// Listeners may add or remove listeners while being notified; the
    /// notification in progress works on a snapshot and is unaffected.
    pub fn set(&self, value: T) {
        self.store(value);
        self.deliver();
    }

    /// Stores the value and queues it for delivery without notifying anyone.
    pub(crate) fn store(&self, value: T) {
        let mut registry = self.registry();
        self.inner.value.set(value.clone());
        if !registry.disposed {
            registry.pending.push_back(value);
        }
    }

    /// Delivers queued values, oldest first, unless a delivery round is
    /// already running.
    pub(crate) fn deliver(&self) {
        {
            let mut registry = self.registry();
            if registry.delivering || registry.pending.is_empty() {
                return;
            }
            registry.delivering = true;
        }
        let mut delivery = Delivery {
            registry: &self.inner.registry,
            finished: false,
        };
        loop {
            let (value, snapshot) = {
                let mut registry = self.registry();
                let Some(value) = registry.pending.pop_front() else {
                    registry.delivering = false;
                    delivery.finished = true;
                    return;
                };
                let snapshot: Vec<Listener<T>> = registry
                    .listeners
                    .iter()
                    .map(|(_, listener)| listener.clone())
                    .collect();
                (value, snapshot)
            };
            trace!(listeners = snapshot.len(), "notifying listeners");
            for listener in snapshot {
                listener(&value);
            }
        }
    }

    /// Replaces the value with the result of `reducer` applied to the current one.
    pub fn update(&self, reducer: impl FnOnce(&T) -> T) {
        let next = self.with(reducer);
        self.set(next);
    }

    /// Registers a listener. After disposal this registers nothing and
    /// returns an id that matches no listener.
    pub fn add_listener(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let mut registry = self.registry();
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;
        if registry.disposed {
            trace!(?id, "listener added after dispose, ignored");
        } else {
            registry.listeners.push((id, Arc::new(listener)));
        }
        id
    }

    /// Returns whether a listener with this id was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut registry = self.registry();
        let before = registry.listeners.len();
        registry.listeners.retain(|(listener_id, _)| *listener_id != id);
        registry.listeners.len() != before
    }

    /// Registers a listener and returns a handle that removes it when
    /// cancelled or dropped.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.add_listener(listener);
        let this = self.clone();
        Subscription::new(move || {
            this.remove_listener(id);
        })
    }

    pub fn listener_count(&self) -> usize {
        self.registry().listeners.len()
    }

    /// Registers a callback run once on disposal. If the value is already
    /// disposed the callback runs immediately.
    pub fn on_dispose(&self, callback: impl FnOnce() + Send + 'static) {
        let mut registry = self.registry();
        if registry.disposed {
            drop(registry);
            callback();
        } else {
            registry.dispose_callbacks.push(Box::new(callback));
        }
    }

    /// Runs the dispose callbacks, then clears all listeners. Repeated calls
    /// do nothing.
    pub fn dispose(&self) {
        let callbacks = {
            let mut registry = self.registry();
            if registry.disposed {
                return;
            }
            registry.disposed = true;
            std::mem::take(&mut registry.dispose_callbacks)
        };
        trace!(callbacks = callbacks.len(), "disposing observable");
        for callback in callbacks {
            callback();
        }
        let mut registry = self.registry();
        registry.listeners.clear();
        registry.pending.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.registry().disposed
    }

    /// A lossy signal of the value: observers see the latest value, not
    /// necessarily every intermediate one.
    pub fn to_signal(&self) -> MutableSignalCloned<T> {
        self.inner.value.signal_cloned()
    }

    pub fn to_stream(&self) -> SignalStream<MutableSignalCloned<T>> {
        self.inner.value.signal_cloned().to_stream()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Default for ObservableValue<T>
where
    T: Default + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        ObservableValue::new(T::default())
    }
}

impl<T> ChangeNotifier for ObservableValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn add_change_listener(&self, listener: Arc<dyn Fn() + Send + Sync>) -> ListenerId {
        self.add_listener(move |_| listener())
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        ObservableValue::remove_listener(self, id)
    }

    fn on_dispose(&self, callback: Box<dyn FnOnce() + Send>) {
        ObservableValue::on_dispose(self, callback)
    }
}

impl<T> fmt::Debug for ObservableValue<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableValue")
            .field("value", &*self.inner.value.lock_ref())
            .finish_non_exhaustive()
    }
}
