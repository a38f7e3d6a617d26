//! Cooperative Mutex
//!
//! A lock with two ways in:
//!
//! - [`CoopMutex::try_acquire`] never waits. Registry mutators use it so that
//!   a mutation attempted inside another mutation fails fast instead of
//!   deadlocking.
//! - [`CoopMutex::acquire`] suspends the calling task and queues it FIFO.
//!   On release the lock is handed straight to the oldest waiter, so it
//!   never appears free while someone is queued.
//!
//! There is no timeout. Every protected section is short and synchronous.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::oneshot;

#[derive(Default)]
struct LockState {
    locked: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// The registry's mutual-exclusion primitive.
#[derive(Default)]
pub struct CoopMutex {
    state: Mutex<LockState>,
}

/// Proof of holding a [`CoopMutex`]. Dropping it releases the lock.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    mutex: &'a CoopMutex,
}

impl LockGuard<'_> {
    /// Release the lock now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}

/// A queued `acquire()` that has not completed yet.
///
/// If the future is dropped after the lock was handed to it, the lock is
/// passed on instead of being leaked.
struct Waiter<'a> {
    mutex: &'a CoopMutex,
    receiver: Option<oneshot::Receiver<()>>,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
            if receiver.try_recv().is_ok() {
                self.mutex.release();
            }
        }
    }
}

impl CoopMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock if it is free, without waiting.
    pub fn try_acquire(&self) -> Option<LockGuard<'_>> {
        let mut state = self.state.lock();
        if state.locked {
            return None;
        }
        state.locked = true;
        Some(LockGuard { mutex: self })
    }

    /// Take the lock, waiting behind earlier callers if it is held.
    pub async fn acquire(&self) -> LockGuard<'_> {
        loop {
            let receiver = {
                let mut state = self.state.lock();
                if !state.locked {
                    state.locked = true;
                    return LockGuard { mutex: self };
                }
                let (sender, receiver) = oneshot::channel();
                state.waiters.push_back(sender);
                receiver
            };

            let mut waiter = Waiter {
                mutex: self,
                receiver: Some(receiver),
            };
            let granted = match waiter.receiver.as_mut() {
                Some(receiver) => receiver.await.is_ok(),
                None => false,
            };
            waiter.receiver = None;
            if granted {
                return LockGuard { mutex: self };
            }
        }
    }

    /// Whether the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    /// Number of callers queued in `acquire()`.
    pub fn queued(&self) -> usize {
        self.state.lock().waiters.len()
    }

    fn release(&self) {
        let mut state = self.state.lock();
        while let Some(next) = state.waiters.pop_front() {
            // A send only fails if that waiter's future was dropped.
            if next.send(()).is_ok() {
                return;
            }
        }
        state.locked = false;
    }
}

impl std::fmt::Debug for CoopMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CoopMutex")
            .field("locked", &state.locked)
            .field("queued", &state.waiters.len())
            .finish()
    }
}
