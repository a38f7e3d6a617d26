//! Synchronization primitives for the hook registry.

mod mutex;

pub use mutex::{CoopMutex, LockGuard};
