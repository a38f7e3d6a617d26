//! Reactive Primitives
//!
//! This module implements the fine-grained reactive graph: signals,
//! computeds and watchers.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (a computed or watcher), the signal registers
//! that context as a subscriber. When the value changes, subscribers are
//! notified synchronously in subscription order.
//!
//! ## Computeds
//!
//! A Computed is a derived value. Its dependency set is whatever it read
//! during its latest evaluation, so branches that are no longer taken stop
//! triggering it.
//!
//! ## Watchers
//!
//! A Watcher is an effect. Notifications only mark it pending; the actual
//! re-run happens when the host drains the microtask queue with
//! [`flush_microtasks`]. This is where batching comes from.
//!
//! # Implementation Notes
//!
//! The tracking context is thread-local. Signal notification is synchronous
//! and watcher execution is deferred to the same thread's microtask queue,
//! matching a single-threaded cooperative scheduler.

mod computed;
mod scheduler;
mod signal;
mod subscriber;
mod tracking;
mod watcher;

pub use computed::Computed;
pub use scheduler::{flush_microtasks, pending_microtasks, queue_microtask, Microtask};
pub use signal::{EqualsFn, Signal};
pub use subscriber::{NodeId, Source, Subscriber};
pub use tracking::{is_tracking, untrack};
pub use watcher::Watcher;
