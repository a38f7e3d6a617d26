//! Effect and Memo Hooks
//!
//! # How Effects Work
//!
//! 1. `use_effect` compares its dependencies with those of the last run
//! 2. If they changed (or there are none, or this is the first pass) the
//!    effect is queued on the context
//! 3. After the pass returns `Ok`, queued effects are flushed: the previous
//!    cleanup runs, then the effect, and whatever cleanup it returns is kept
//!    for next time
//!
//! Effects and cleanups are user code, so each runs through `isolate`; one
//! failing effect never stops the others.
//!
//! `use_memo` and `use_callback` share one slot layout: the cached value and
//! the dependencies it was computed from.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;

use super::context::Context;
use super::kind::{Cleanup, Deps, EffectSlot, HookData, HookKind, MemoSlot};
use super::registry::HookHandle;
use crate::error::{isolate, HookError, Result};

pub(crate) type EffectFn = Box<dyn FnOnce() -> Option<Cleanup> + Send>;

/// An effect waiting for its pass to finish.
pub(crate) struct PendingEffect {
    handle: HookHandle,
    slot: EffectSlot,
    deps: Option<Deps>,
    effect: EffectFn,
}

impl Context {
    /// Run `effect` after this pass when `deps` changed since the last run.
    ///
    /// `None` deps run the effect after every pass. An empty slice runs it
    /// once.
    pub fn use_effect<F>(&self, deps: Option<&[Value]>, effect: F) -> Result<()>
    where
        F: FnOnce() -> Option<Cleanup> + Send + 'static,
    {
        let handle = self
            .registry
            .create_with(HookKind::Effect, || HookData::Effect(EffectSlot::default()))?;
        let slot = match self.slot(handle)? {
            HookData::Effect(slot) => slot,
            other => {
                return Err(HookError::PayloadMismatch {
                    kind: HookKind::Effect,
                    found: other.shape(),
                })
            }
        };

        let deps: Option<Deps> = deps.map(|deps| deps.iter().cloned().collect());
        let due = !slot.has_run || deps.is_none() || slot.deps != deps;
        if due {
            self.pending_effects.lock().push(PendingEffect {
                handle,
                slot,
                deps,
                effect: Box::new(effect),
            });
        }
        Ok(())
    }

    /// Run the effects queued so far. Returns how many ran.
    ///
    /// `with_frame` calls this after every successful pass.
    pub fn flush_effects(&self) -> Result<usize> {
        let pending = std::mem::take(&mut *self.pending_effects.lock());
        let mut ran = 0;

        for PendingEffect {
            handle,
            slot,
            deps,
            effect,
        } in pending
        {
            let recorded = EffectSlot {
                deps,
                has_run: true,
                cleanup: Arc::clone(&slot.cleanup),
            };
            match self.registry.write(handle, HookData::Effect(recorded)) {
                Ok(()) => {}
                // The frame was cleared before the effect got to run.
                Err(HookError::HookNotFound(_)) => continue,
                Err(err) => return Err(err),
            }

            if let Some(cleanup) = slot.take_cleanup() {
                isolate("effect cleanup", cleanup);
            }
            if let Some(Some(cleanup)) = isolate("effect", effect) {
                *slot.cleanup.lock() = Some(cleanup);
            }
            ran += 1;
        }
        Ok(ran)
    }

    /// `f`, kept stable until `deps` change.
    pub fn use_callback<F>(&self, deps: &[Value], f: F) -> Result<Arc<F>>
    where
        F: Send + Sync + 'static,
    {
        self.memoize(HookKind::Callback, deps, || f)
    }

    /// `compute()`, re-run only when `deps` change.
    pub fn use_memo<T>(&self, deps: &[Value], compute: impl FnOnce() -> T) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let value = self.memoize(HookKind::Memo, deps, compute)?;
        Ok(T::clone(&value))
    }

    fn memoize<V>(&self, kind: HookKind, deps: &[Value], compute: impl FnOnce() -> V) -> Result<Arc<V>>
    where
        V: Send + Sync + 'static,
    {
        let deps: Deps = deps.iter().cloned().collect();
        let handle = self
            .registry
            .create_with(kind, || HookData::Memo(MemoSlot::unset()))?;
        let slot = match self.slot(handle)? {
            HookData::Memo(slot) => slot,
            other => {
                return Err(HookError::PayloadMismatch {
                    kind,
                    found: other.shape(),
                })
            }
        };

        if slot.deps == deps {
            if let Ok(value) = slot.value.downcast::<V>() {
                return Ok(value);
            }
        }

        let value = Arc::new(compute());
        let cached: Arc<dyn Any + Send + Sync> = value.clone();
        self.registry
            .write(handle, HookData::Memo(MemoSlot { deps, value: cached }))?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookRegistry;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context() -> Context {
        Context::builder(Arc::new(HookRegistry::new())).build()
    }

    fn log_effect(log: &Arc<Mutex<Vec<String>>>, name: &str) -> impl FnOnce() -> Option<Cleanup> + Send + 'static {
        let log = log.clone();
        let name = name.to_owned();
        move || {
            log.lock().push(format!("run {name}"));
            let log = log.clone();
            Some(Box::new(move || log.lock().push(format!("cleanup {name}"))) as Cleanup)
        }
    }

    #[test]
    fn effect_runs_after_pass_and_respects_deps() {
        let cx = context();
        let log = Arc::new(Mutex::new(Vec::new()));

        for (pass, dep) in [(1, 0), (2, 0), (3, 1)] {
            let effect = log_effect(&log, &format!("p{pass}"));
            cx.with_frame("f", |cx| {
                cx.use_effect(Some(&[json!(dep)][..]), effect)?;
                assert!(log.lock().iter().all(|line| !line.contains(&format!("p{pass}"))));
                Ok(())
            })
            .unwrap();
        }

        assert_eq!(*log.lock(), vec!["run p1", "cleanup p1", "run p3"]);
    }

    #[test]
    fn effect_without_deps_runs_every_pass() {
        let cx = context();
        let runs = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let runs = runs.clone();
            cx.with_frame("f", |cx| {
                cx.use_effect(None, move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    None
                })
            })
            .unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failed_pass_discards_effects() {
        let cx = context();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let result = cx.with_frame("f", |cx| {
            cx.use_effect(Some(&[][..]), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                None
            })?;
            Err::<(), _>(HookError::NoActiveFrame)
        });

        assert!(result.is_err());
        assert_eq!(cx.flush_effects().unwrap(), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_nested_pass_keeps_outer_effects() {
        let cx = context();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        cx.with_frame("outer", |cx| {
            cx.use_effect(None, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                None
            })?;
            let nested = cx.with_frame("inner", |cx| cx.use_id());
            assert!(matches!(nested, Err(HookError::FrameReentrancy { .. })));
            Ok(())
        })
        .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_effect_does_not_stop_siblings() {
        let cx = context();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        cx.with_frame("f", |cx| {
            cx.use_effect(Some(&[][..]), || panic!("effect failed"))?;
            cx.use_effect(Some(&[][..]), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                None
            })
        })
        .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_frame_runs_cleanup() {
        let cx = context();
        let log = Arc::new(Mutex::new(Vec::new()));
        let effect = log_effect(&log, "mount");
        cx.with_frame("f", |cx| cx.use_effect(Some(&[][..]), effect)).unwrap();

        cx.clear_frame("f").unwrap();
        assert_eq!(*log.lock(), vec!["run mount", "cleanup mount"]);
    }

    #[test]
    fn memo_recomputes_on_dep_change() {
        let cx = context();
        let computed = AtomicUsize::new(0);
        let mut results = Vec::new();

        for dep in [1, 1, 2] {
            let value = cx
                .with_frame("m", |cx| {
                    cx.use_memo(&[json!(dep)], || {
                        computed.fetch_add(1, Ordering::SeqCst);
                        dep * 100
                    })
                })
                .unwrap();
            results.push(value);
        }

        assert_eq!(results, vec![100, 100, 200]);
        assert_eq!(computed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn callback_identity_is_stable_until_deps_change() {
        let cx = context();
        let pass = |dep: i32| {
            cx.with_frame("cb", |cx| cx.use_callback(&[json!(dep)], move |x: i32| x + dep))
                .unwrap()
        };

        let first = pass(1);
        let second = pass(1);
        let third = pass(2);

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!((*third)(1), 3);
    }
}
