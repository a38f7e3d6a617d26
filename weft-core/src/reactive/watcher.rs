//! Watcher Implementation
//!
//! A Watcher is a side-effecting computation that re-runs whenever one of
//! the sources it read during its last run changes.
//!
//! # How Watchers Work
//!
//! 1. When created with [`Watcher::new`], the callback runs immediately to
//!    establish its initial sources.
//!
//! 2. When a source changes, the watcher marks itself pending and enqueues a
//!    single microtask. Further notifications while pending are absorbed, so
//!    any number of synchronous writes yields one re-run.
//!
//! 3. Each run drops every old source and collects new ones while the
//!    callback executes.
//!
//! # Stopping
//!
//! [`Watcher::stop`] unlinks the watcher from all sources. A run that was
//! already queued still fires, sees the watcher inactive and does nothing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::scheduler::queue_microtask;
use super::subscriber::{unlink_all, NodeId, Source, SourceSet, Subscriber};
use super::tracking::WatcherGuard;
use crate::error::isolate;

struct WatcherInner {
    id: NodeId,
    callback: Box<dyn Fn() + Send + Sync>,
    sources: Mutex<SourceSet>,
    active: AtomicBool,
    pending: AtomicBool,
    run_count: AtomicU64,
    this: Weak<WatcherInner>,
}

impl WatcherInner {
    fn run(&self) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };

        let previous = self.sources.lock().take();
        unlink_all(self.id, previous);

        isolate("watcher callback", || {
            let _guard = WatcherGuard::enter(this);
            (self.callback)();
        });
        self.run_count.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        let previous = self.sources.lock().take();
        unlink_all(self.id, previous);
    }
}

impl Subscriber for WatcherInner {
    fn subscriber_id(&self) -> NodeId {
        self.id
    }

    fn update(&self, source: NodeId) {
        if !self.active.load(Ordering::SeqCst) || !self.sources.lock().contains(source) {
            return;
        }
        if self.pending.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::debug!(watcher = self.id.raw(), source = source.raw(), "watcher scheduled");
        let this = self.this.clone();
        queue_microtask(move || {
            if let Some(watcher) = this.upgrade() {
                watcher.pending.store(false, Ordering::SeqCst);
                watcher.run();
            }
        });
    }

    fn track(&self, source: Arc<dyn Source>) {
        self.sources.lock().insert(source);
    }
}

/// A side-effecting computation that re-runs when its sources change.
///
/// # Example
///
/// ```rust
/// use weft_core::reactive::{flush_microtasks, Signal, Watcher};
///
/// let count = Signal::new(0);
/// let watcher = Watcher::new({
///     let count = count.clone();
///     move || println!("count is {}", count.get())
/// });
///
/// count.set(5);
/// flush_microtasks(); // prints "count is 5"
/// watcher.stop();
/// ```
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<WatcherInner>,
}

impl Watcher {
    /// Create a watcher and run it once to collect its sources.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let watcher = Self::new_lazy(callback);
        watcher.run();
        watcher
    }

    /// Create a watcher without running it.
    ///
    /// It has no sources, and therefore reacts to nothing, until
    /// [`Watcher::run`] is called.
    pub fn new_lazy<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|this| WatcherInner {
            id: NodeId::new(),
            callback: Box::new(callback),
            sources: Mutex::new(SourceSet::default()),
            active: AtomicBool::new(true),
            pending: AtomicBool::new(false),
            run_count: AtomicU64::new(0),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Get the watcher's node id.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Run the callback now, rebuilding the source set.
    pub fn run(&self) {
        self.inner.run();
    }

    /// Deactivate and unlink from every source. Idempotent.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Whether the watcher still reacts to changes.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Whether a re-run is queued.
    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> u64 {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Number of sources read by the latest run.
    pub fn source_count(&self) -> usize {
        self.inner.sources.lock().len()
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("source_count", &self.source_count())
            .field("active", &self.is_active())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{flush_microtasks, pending_microtasks, Signal};
    use std::sync::atomic::AtomicI32;

    #[test]
    fn watcher_runs_on_creation() {
        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let watcher = Watcher::new(move || {
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(run_count.load(Ordering::SeqCst), 1);
        assert_eq!(watcher.run_count(), 1);
    }

    #[test]
    fn lazy_watcher_does_not_run_on_creation() {
        let watcher = Watcher::new_lazy(|| {});
        assert_eq!(watcher.run_count(), 0);

        watcher.run();
        assert_eq!(watcher.run_count(), 1);
    }

    #[test]
    fn change_defers_rerun_to_microtask() {
        let signal = Signal::new(0);
        let seen = Arc::new(AtomicI32::new(-1));
        let watcher = Watcher::new({
            let signal = signal.clone();
            let seen = seen.clone();
            move || seen.store(signal.get(), Ordering::SeqCst)
        });
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        signal.set(7);
        assert!(watcher.is_pending());
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        assert_eq!(flush_microtasks(), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert!(!watcher.is_pending());
    }

    #[test]
    fn repeated_writes_schedule_once() {
        let signal = Signal::new(0);
        let watcher = Watcher::new({
            let signal = signal.clone();
            move || {
                signal.get();
            }
        });

        signal.set(1);
        signal.set(2);
        signal.set(3);
        assert_eq!(pending_microtasks(), 1);

        flush_microtasks();
        assert_eq!(watcher.run_count(), 2);
    }

    #[test]
    fn stop_unlinks_and_is_idempotent() {
        let signal = Signal::new(0);
        let watcher = Watcher::new({
            let signal = signal.clone();
            move || {
                signal.get();
            }
        });
        assert_eq!(signal.subscriber_count(), 1);

        watcher.stop();
        watcher.stop();
        assert!(!watcher.is_active());
        assert_eq!(signal.subscriber_count(), 0);

        signal.set(1);
        assert_eq!(flush_microtasks(), 0);
        assert_eq!(watcher.run_count(), 1);
    }

    #[test]
    fn stop_after_scheduling_makes_queued_run_a_no_op() {
        let signal = Signal::new(0);
        let watcher = Watcher::new({
            let signal = signal.clone();
            move || {
                signal.get();
            }
        });

        signal.set(1);
        watcher.stop();

        assert_eq!(flush_microtasks(), 1);
        assert_eq!(watcher.run_count(), 1);
    }

    #[test]
    fn panicking_callback_is_contained() {
        let signal = Signal::new(0);
        let watcher = Watcher::new({
            let signal = signal.clone();
            move || {
                if signal.get() == 1 {
                    panic!("watcher failed");
                }
            }
        });

        signal.set(1);
        flush_microtasks();
        assert_eq!(watcher.run_count(), 2);
        assert!(watcher.is_active());
    }

    #[test]
    fn dropped_watcher_is_not_kept_alive_by_signal() {
        let signal = Signal::new(0);
        let watcher = Watcher::new({
            let signal = signal.clone();
            move || {
                signal.get();
            }
        });
        drop(watcher);

        assert_eq!(signal.subscriber_count(), 0);
        signal.set(1);
        assert_eq!(flush_microtasks(), 0);
    }
}
