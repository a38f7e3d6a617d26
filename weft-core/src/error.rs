//! Error types and callback isolation.
//!
//! Structural failures (lock contention, broken call order, frame misuse)
//! are programmer errors and surface through [`HookError`]. Failures inside
//! user callbacks (effects, listeners, watchers, handlers) are caught by
//! [`isolate`], logged, and go no further.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::hooks::{FrameId, HookIndex, HookKind};

pub type Result<T, E = HookError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum HookError {
    /// A synchronous mutator found the registry lock held.
    #[error("hook registry is locked by another mutator")]
    LockContention,

    /// Positional reuse found a different kind than requested.
    #[error(
        "hook kind mismatch in frame `{frame}` at position {position}: \
         expected {expected}, found {found}"
    )]
    HookKindMismatch {
        frame: FrameId,
        position: usize,
        expected: HookKind,
        found: HookKind,
    },

    #[error("cannot patch hook {index}: data is not an object")]
    InvalidPatchTarget { index: HookIndex },

    #[error("cannot start frame `{requested}` while frame `{active}` is active")]
    FrameReentrancy { active: FrameId, requested: FrameId },

    #[error("no frame is active")]
    NoActiveFrame,

    #[error("frame `{0}` is active and cannot be cleared")]
    FrameInUse(FrameId),

    #[error("hook {0} does not exist")]
    HookNotFound(HookIndex),

    #[error("{kind} hook cannot hold {found} data")]
    PayloadMismatch { kind: HookKind, found: &'static str },

    #[error("JSON error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

/// Run a user callback, catching and logging a panic instead of unwinding
/// into the caller.
pub(crate) fn isolate<R>(what: &str, f: impl FnOnce() -> R) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            tracing::error!(callback = what, reason = panic_message(&*payload), "callback panicked");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolate_returns_value() {
        assert_eq!(isolate("ok", || 5), Some(5));
    }

    #[test]
    fn isolate_swallows_panic() {
        let result: Option<()> = isolate("failing", || panic!("effect exploded"));
        assert!(result.is_none());
    }

    #[test]
    fn panic_message_reads_both_payload_kinds() {
        let literal: Box<dyn Any + Send> = Box::new("literal");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(&*literal), "literal");
        assert_eq!(panic_message(&*owned), "owned");
        assert_eq!(panic_message(&*other), "non-string panic payload");
    }

    #[test]
    fn kind_mismatch_names_both_kinds() {
        let err = HookError::HookKindMismatch {
            frame: FrameId::from("counter"),
            position: 2,
            expected: HookKind::State,
            found: HookKind::Effect,
        };
        assert_eq!(
            err.to_string(),
            "hook kind mismatch in frame `counter` at position 2: expected state, found effect"
        );
    }
}
