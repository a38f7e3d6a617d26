//! Dependency Tracking
//!
//! The tracking context records which computation is currently collecting
//! dependencies, so that any signal read during that evaluation can
//! register itself as a dependency.
//!
//! # Implementation
//!
//! Each thread has one tracking cell holding two things:
//!
//! - a stack of computeds under evaluation (computeds nest: a computed that
//!   reads another computed may force it to evaluate), and
//! - a single watcher slot (watchers do not nest; running a watcher replaces
//!   the slot and restores the previous occupant afterwards).
//!
//! Every push has a matching guard whose `Drop` pops, so the cell stays
//! balanced even if a computation panics.

use std::cell::RefCell;
use std::sync::Arc;

use smallvec::SmallVec;

use super::subscriber::{link, NodeId, Source, Subscriber};

thread_local! {
    static TRACKING: RefCell<TrackingState> = RefCell::new(TrackingState::default());
}

#[derive(Default)]
struct TrackingState {
    computing: Vec<Arc<dyn Subscriber>>,
    watcher: Option<Arc<dyn Subscriber>>,
}

/// Guard that pops a computed off the tracking stack when dropped.
pub(crate) struct ComputingGuard {
    id: NodeId,
}

impl ComputingGuard {
    pub(crate) fn enter(computed: Arc<dyn Subscriber>) -> Self {
        let id = computed.subscriber_id();
        TRACKING.with(|state| state.borrow_mut().computing.push(computed));
        Self { id }
    }
}

impl Drop for ComputingGuard {
    fn drop(&mut self) {
        TRACKING.with(|state| {
            let popped = state.borrow_mut().computing.pop();
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber_id(),
                    self.id,
                    "tracking stack mismatch: expected {:?}, got {:?}",
                    self.id,
                    entry.subscriber_id()
                );
            }
        });
    }
}

/// Guard that restores the previous watcher slot when dropped.
pub(crate) struct WatcherGuard {
    previous: Option<Arc<dyn Subscriber>>,
}

impl WatcherGuard {
    pub(crate) fn enter(watcher: Arc<dyn Subscriber>) -> Self {
        let previous = TRACKING.with(|state| state.borrow_mut().watcher.replace(watcher));
        Self { previous }
    }
}

impl Drop for WatcherGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        TRACKING.with(|state| state.borrow_mut().watcher = previous);
    }
}

/// Guard that puts a saved tracking state back when dropped.
struct RestoreGuard {
    saved: Option<TrackingState>,
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            TRACKING.with(|state| *state.borrow_mut() = saved);
        }
    }
}

/// Link `source` to the computed on top of the stack and to the running
/// watcher. Either, both, or neither may be present.
///
/// The cell borrow is released before linking: adding a subscriber to a
/// stale computed evaluates it, which pushes onto the stack again.
pub(crate) fn track_dependency(source: Arc<dyn Source>) {
    let targets: SmallVec<[Arc<dyn Subscriber>; 2]> = TRACKING.with(|state| {
        let state = state.borrow();
        state
            .computing
            .last()
            .cloned()
            .into_iter()
            .chain(state.watcher.clone())
            .collect()
    });

    for subscriber in &targets {
        link(&source, subscriber);
    }
}

/// Check whether any computed or watcher is collecting dependencies.
pub fn is_tracking() -> bool {
    TRACKING.with(|state| {
        let state = state.borrow();
        !state.computing.is_empty() || state.watcher.is_some()
    })
}

/// Run `f` with all ambient tracking suspended.
///
/// Reads inside `f` establish no dependencies. The previous state is put
/// back afterwards, also when `f` panics.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let saved = TRACKING.with(|state| std::mem::take(&mut *state.borrow_mut()));
    let _restore = RestoreGuard { saved: Some(saved) };
    f()
}
