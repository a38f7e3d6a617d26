//! Transition Hook
//!
//! A transition defers work to the microtask queue and exposes a `pending`
//! flag while it is outstanding:
//!
//! ```text
//! start(f) -> pending = true, render
//! flush    -> f(), pending = false, render
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};

use super::context::{request_render, Context, RenderTrigger};
use super::kind::HookKind;
use super::registry::{HookHandle, HookRegistry};
use crate::error::{isolate, Result};
use crate::reactive::queue_microtask;

/// Starts deferred work for a `use_transition` slot.
#[derive(Clone)]
pub struct Transition {
    registry: Arc<HookRegistry>,
    handle: HookHandle,
    trigger: Option<RenderTrigger>,
}

impl Transition {
    /// Mark the slot pending and run `f` on the next microtask flush.
    pub fn start(&self, f: impl FnOnce() + 'static) -> Result<()> {
        self.set_pending(true)?;
        let this = self.clone();
        queue_microtask(move || {
            isolate("transition", f);
            if let Err(err) = this.set_pending(false) {
                tracing::warn!(%err, "failed to settle transition");
            }
        });
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.registry
            .read(self.handle)
            .and_then(|data| data.as_value().and_then(|v| v.get("pending")).and_then(Value::as_bool))
            .unwrap_or(false)
    }

    fn set_pending(&self, pending: bool) -> Result<()> {
        self.registry.patch(self.handle, json!({ "pending": pending }))?;
        request_render(&self.trigger);
        Ok(())
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("handle", &self.handle)
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl Context {
    /// `(pending, transition)` for this slot.
    pub fn use_transition(&self) -> Result<(bool, Transition)> {
        let handle = self
            .registry
            .create_with(HookKind::Transition, || json!({ "pending": false }).into())?;
        let transition = Transition {
            registry: Arc::clone(&self.registry),
            handle,
            trigger: self.render_trigger.clone(),
        };
        Ok((transition.is_pending(), transition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::flush_microtasks;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn start_defers_work_and_toggles_pending() {
        let renders = Arc::new(AtomicUsize::new(0));
        let counter = renders.clone();
        let cx = Context::builder(Arc::new(HookRegistry::new()))
            .render_trigger(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        let (pending, transition) = cx.with_frame("t", |cx| cx.use_transition()).unwrap();
        assert!(!pending);

        let done = Rc::new(Cell::new(false));
        let flag = done.clone();
        transition.start(move || flag.set(true)).unwrap();

        assert!(transition.is_pending());
        assert!(!done.get());
        assert_eq!(renders.load(Ordering::SeqCst), 1);
        let (pending, _) = cx.with_frame("t", |cx| cx.use_transition()).unwrap();
        assert!(pending);

        flush_microtasks();
        assert!(done.get());
        assert!(!transition.is_pending());
        assert_eq!(renders.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_transition_still_settles() {
        let cx = Context::builder(Arc::new(HookRegistry::new())).build();
        let (_, transition) = cx.with_frame("t", |cx| cx.use_transition()).unwrap();

        transition.start(|| panic!("transition failed")).unwrap();
        flush_microtasks();
        assert!(!transition.is_pending());
    }
}
