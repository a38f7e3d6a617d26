//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a tracking context (computed/watcher),
//!    the signal registers that context as a subscriber.
//!
//! 2. When a signal is set to a value its `equals` function considers
//!    different, every subscriber is notified synchronously, in the order
//!    it subscribed.
//!
//! 3. Computeds recompute inside the notification; watchers only mark
//!    themselves pending and re-run from the microtask queue.
//!
//! # Subscribers
//!
//! Subscribers are held weakly. Notification walks a snapshot taken when
//! `set()` starts, so a subscriber linked during notification is first seen
//! by the next `set()`.

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::subscriber::{NodeId, Source, Subscriber, SubscriberSet};
use super::tracking;
use crate::error::isolate;

/// Equality test deciding whether a write is a change.
pub type EqualsFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

type LifecycleFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Lifecycle {
    watched: bool,
    on_watched: Option<LifecycleFn>,
    on_unwatched: Option<LifecycleFn>,
}

struct SignalInner<T> {
    id: NodeId,
    value: RwLock<T>,
    equals: EqualsFn<T>,
    subscribers: Mutex<SubscriberSet>,
    lifecycle: Mutex<Lifecycle>,
}

impl<T> Source for SignalInner<T>
where
    T: Send + Sync + 'static,
{
    fn source_id(&self) -> NodeId {
        self.id
    }

    fn add_subscriber(&self, id: NodeId, subscriber: Weak<dyn Subscriber>) {
        self.subscribers.lock().insert(id, subscriber);
    }

    fn remove_subscriber(&self, id: NodeId) {
        self.subscribers.lock().remove(id);
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// A reactive cell holding a value of type `T`.
///
/// Cloning a `Signal` yields another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use weft_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a signal that treats `PartialEq`-equal writes as no-ops.
    ///
    /// This is structural equality, not identity: writing a new value that
    /// compares equal to the stored one notifies nobody. For identity
    /// semantics store an `Arc<_>` and use
    /// [`with_equals`](Self::with_equals) with `|a, b| Arc::ptr_eq(a, b)`.
    pub fn new(value: T) -> Self {
        Self::with_equals(value, |a, b| a == b)
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a signal with a custom equality test.
    ///
    /// Pass `|a, b| Arc::ptr_eq(a, b)` for reference identity, or
    /// `|_, _| false` to notify on every write.
    pub fn with_equals<F>(value: T, equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(SignalInner {
                id: NodeId::new(),
                value: RwLock::new(value),
                equals: Arc::new(equals),
                subscribers: Mutex::new(SubscriberSet::default()),
                lifecycle: Mutex::new(Lifecycle::default()),
            }),
        }
    }

    /// Get the signal's node id.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a tracking context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        if tracking::is_tracking() {
            tracking::track_dependency(self.as_source());
        }
        self.inner.value.read().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Borrow the current value without cloning or tracking.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.inner.value.read())
    }

    /// Store `value` and notify subscribers, unless it equals the current
    /// value.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.write();
            if (self.inner.equals)(&*current, &value) {
                return;
            }
            *current = value;
        }

        let subscribers = self.inner.subscribers.lock().snapshot();
        for subscriber in subscribers {
            subscriber.update(self.inner.id);
        }

        self.check_watched();
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&*self.inner.value.read());
        self.set(next);
    }

    /// Run `f` when the subscriber count goes from zero to non-zero, as
    /// observed at the end of a `set()`.
    pub fn on_watched<F>(&self, f: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.lifecycle.lock().on_watched = Some(Arc::new(f));
        self
    }

    /// Run `f` when the subscriber count drops back to zero, as observed at
    /// the end of a `set()`.
    pub fn on_unwatched<F>(&self, f: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.lifecycle.lock().on_unwatched = Some(Arc::new(f));
        self
    }

    /// Get the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }

    fn as_source(&self) -> Arc<dyn Source> {
        self.inner.clone()
    }

    fn check_watched(&self) {
        let watched = self.inner.subscriber_count() > 0;
        let callback = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.watched == watched {
                return;
            }
            lifecycle.watched = watched;
            if watched {
                lifecycle.on_watched.clone()
            } else {
                lifecycle.on_unwatched.clone()
            }
        };

        if let Some(callback) = callback {
            isolate("signal lifecycle callback", || callback());
        }
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
