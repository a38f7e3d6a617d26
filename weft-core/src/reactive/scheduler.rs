//! Microtask Queue
//!
//! Watcher re-runs (and transition bodies) are deferred to this queue rather
//! than executed inside the `set()` that triggered them. Many synchronous
//! writes therefore collapse into one deferred run per watcher.
//!
//! The queue is per thread and drained explicitly by the host, which plays
//! the part of the event loop: call [`flush_microtasks`] after each batch of
//! synchronous work, before yielding.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::error::isolate;

/// A deferred unit of work.
pub type Microtask = Box<dyn FnOnce()>;

thread_local! {
    static MICROTASKS: RefCell<VecDeque<Microtask>> = RefCell::new(VecDeque::new());
}

/// Enqueue `task` to run on the next [`flush_microtasks`].
pub fn queue_microtask(task: impl FnOnce() + 'static) {
    MICROTASKS.with(|queue| queue.borrow_mut().push_back(Box::new(task)));
}

/// Number of tasks waiting on this thread.
pub fn pending_microtasks() -> usize {
    MICROTASKS.with(|queue| queue.borrow().len())
}

/// Run queued tasks until the queue is empty.
///
/// Tasks enqueued while draining run in the same flush, after everything
/// that was queued before them. A panicking task is logged and skipped.
/// Returns the number of tasks executed.
pub fn flush_microtasks() -> usize {
    let mut executed = 0;
    while let Some(task) = MICROTASKS.with(|queue| queue.borrow_mut().pop_front()) {
        isolate("microtask", task);
        executed += 1;
    }
    if executed > 0 {
        tracing::trace!(executed, "microtask queue drained");
    }
    executed
}
