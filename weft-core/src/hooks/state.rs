//! State Hooks
//!
//! `use_state` and `use_reducer` store their value as `{"value": <json>}`, so
//! any `Serialize + DeserializeOwned` type can be kept across passes. A
//! setter compares the new JSON with the stored JSON and only patches and
//! requests a render when they differ.
//!
//! `use_ref` keeps a native value in a shared cell. Mutating it never
//! triggers a render.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use super::context::{request_render, Context, RenderTrigger};
use super::kind::{HookData, HookKind};
use super::registry::{HookHandle, HookRegistry};
use crate::error::{HookError, Result};

/// Updates the value of a `use_state` slot.
pub struct StateSetter<T> {
    registry: Arc<HookRegistry>,
    handle: HookHandle,
    trigger: Option<RenderTrigger>,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            handle: self.handle,
            trigger: self.trigger.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter")
            .field("handle", &self.handle)
            .finish()
    }
}

impl<T: Serialize + DeserializeOwned> StateSetter<T> {
    pub fn handle(&self) -> HookHandle {
        self.handle
    }

    /// Current stored value.
    pub fn get(&self) -> Result<T> {
        let data = self
            .registry
            .read(self.handle)
            .ok_or(HookError::HookNotFound(self.handle.index()))?;
        let value = data
            .as_value()
            .and_then(|payload| payload.get("value"))
            .cloned()
            .ok_or(HookError::PayloadMismatch {
                kind: self.handle.kind(),
                found: data.shape(),
            })?;
        Ok(serde_json::from_value(value)?)
    }

    /// Store `value`. Returns `false`, without rendering, if it equals the
    /// stored value.
    pub fn set(&self, value: T) -> Result<bool> {
        let next = serde_json::to_value(&value)?;
        let unchanged = self
            .registry
            .read(self.handle)
            .and_then(|data| data.as_value().map(|payload| payload.get("value") == Some(&next)))
            .unwrap_or(false);
        if unchanged {
            return Ok(false);
        }

        self.registry.patch(self.handle, json!({ "value": next }))?;
        request_render(&self.trigger);
        Ok(true)
    }

    /// Store `f(current)`.
    pub fn update(&self, f: impl FnOnce(T) -> T) -> Result<bool> {
        let current = self.get()?;
        self.set(f(current))
    }
}

type ReducerFn<S, A> = Arc<dyn Fn(S, A) -> S + Send + Sync>;

/// Sends actions to a `use_reducer` slot.
pub struct Dispatch<S, A> {
    state: StateSetter<S>,
    reducer: Arc<RwLock<ReducerFn<S, A>>>,
}

impl<S, A> Clone for Dispatch<S, A> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            reducer: Arc::clone(&self.reducer),
        }
    }
}

impl<S, A> fmt::Debug for Dispatch<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("handle", &self.state.handle)
            .finish()
    }
}

impl<S: Serialize + DeserializeOwned, A> Dispatch<S, A> {
    /// Apply the most recently rendered reducer to the stored state.
    pub fn dispatch(&self, action: A) -> Result<bool> {
        let reducer = self.reducer.read().clone();
        let current = self.state.get()?;
        self.state.set(reducer(current, action))
    }

    pub fn state(&self) -> Result<S> {
        self.state.get()
    }
}

impl Context {
    /// Persistent value for this slot, initialised from `init` on the first
    /// pass.
    pub fn use_state<T>(&self, init: T) -> Result<(T, StateSetter<T>)>
    where
        T: Serialize + DeserializeOwned,
    {
        self.value_slot(HookKind::State, init)
    }

    /// State driven by `reducer`. Every pass replaces the reducer, and every
    /// [`Dispatch`] handed out for the slot uses the newest one.
    pub fn use_reducer<S, A, R>(&self, reducer: R, init: S) -> Result<(S, Dispatch<S, A>)>
    where
        S: Serialize + DeserializeOwned + 'static,
        A: 'static,
        R: Fn(S, A) -> S + Send + Sync + 'static,
    {
        let (state, setter) = self.value_slot(HookKind::Reducer, init)?;
        let reducer: ReducerFn<S, A> = Arc::new(reducer);
        let index = setter.handle.index();

        let existing = self
            .reducers
            .get(&index)
            .and_then(|cell| Arc::clone(cell.value()).downcast::<RwLock<ReducerFn<S, A>>>().ok());
        let cell = match existing {
            Some(cell) => {
                *cell.write() = reducer;
                cell
            }
            None => {
                let cell = Arc::new(RwLock::new(reducer));
                self.reducers.insert(index, cell.clone());
                cell
            }
        };

        Ok((
            state,
            Dispatch {
                state: setter,
                reducer: cell,
            },
        ))
    }

    /// Mutable cell that survives passes. Changing it does not render.
    pub fn use_ref<T>(&self, init: T) -> Result<Arc<Mutex<T>>>
    where
        T: Send + 'static,
    {
        let handle = self
            .registry
            .create_with(HookKind::Ref, || HookData::Cell(Arc::new(Mutex::new(init))))?;
        match self.slot(handle)? {
            HookData::Cell(cell) => cell.downcast::<Mutex<T>>().map_err(|_| HookError::PayloadMismatch {
                kind: HookKind::Ref,
                found: "cell of another type",
            }),
            other => Err(HookError::PayloadMismatch {
                kind: HookKind::Ref,
                found: other.shape(),
            }),
        }
    }

    fn value_slot<T>(&self, kind: HookKind, init: T) -> Result<(T, StateSetter<T>)>
    where
        T: Serialize + DeserializeOwned,
    {
        let initial = serde_json::to_value(&init)?;
        let handle = self
            .registry
            .create_with(kind, || json!({ "value": initial }).into())?;
        let setter = StateSetter {
            registry: Arc::clone(&self.registry),
            handle,
            trigger: self.render_trigger.clone(),
            _value: PhantomData,
        };
        let value = setter.get()?;
        Ok((value, setter))
    }
}
