//! Hook kinds and their payloads.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use smallvec::SmallVec;

use super::listener::ListenerSlot;

/// Dependency list compared between passes by `use_effect`, `use_memo` and
/// `use_callback`.
pub type Deps = SmallVec<[Value; 4]>;

/// Teardown returned by an effect, run before the effect runs again and
/// when its frame is cleared.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// The closed set of hook kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    State,
    Reducer,
    Ref,
    Effect,
    Callback,
    Memo,
    MediaQuery,
    EventListener,
    Transition,
    Storage,
    Id,
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::State => "state",
            HookKind::Reducer => "reducer",
            HookKind::Ref => "ref",
            HookKind::Effect => "effect",
            HookKind::Callback => "callback",
            HookKind::Memo => "memo",
            HookKind::MediaQuery => "media-query",
            HookKind::EventListener => "event-listener",
            HookKind::Transition => "transition",
            HookKind::Storage => "storage",
            HookKind::Id => "id",
        }
    }

    /// Whether `data` is the payload shape this kind stores.
    pub fn accepts(&self, data: &HookData) -> bool {
        match self {
            HookKind::State
            | HookKind::Reducer
            | HookKind::MediaQuery
            | HookKind::Transition
            | HookKind::Storage
            | HookKind::Id => matches!(data, HookData::Value(_)),
            HookKind::Ref => matches!(data, HookData::Cell(_)),
            HookKind::Effect => matches!(data, HookData::Effect(_)),
            HookKind::Callback | HookKind::Memo => matches!(data, HookData::Memo(_)),
            HookKind::EventListener => matches!(data, HookData::Listener(_)),
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload stored in a hook record.
#[derive(Clone)]
pub enum HookData {
    /// JSON payload: state, reducer, media-query, transition, storage, id.
    Value(Value),
    /// Opaque shared cell backing `use_ref`.
    Cell(Arc<dyn Any + Send + Sync>),
    Effect(EffectSlot),
    Memo(MemoSlot),
    Listener(ListenerSlot),
}

impl HookData {
    pub fn shape(&self) -> &'static str {
        match self {
            HookData::Value(_) => "value",
            HookData::Cell(_) => "cell",
            HookData::Effect(_) => "effect",
            HookData::Memo(_) => "memo",
            HookData::Listener(_) => "listener",
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            HookData::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for HookData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookData::Value(value) => f.debug_tuple("Value").field(value).finish(),
            HookData::Cell(_) => f.write_str("Cell(..)"),
            HookData::Effect(slot) => f.debug_tuple("Effect").field(slot).finish(),
            HookData::Memo(slot) => f.debug_struct("Memo").field("deps", &slot.deps).finish(),
            HookData::Listener(slot) => f.debug_tuple("Listener").field(slot).finish(),
        }
    }
}

impl From<Value> for HookData {
    fn from(value: Value) -> Self {
        HookData::Value(value)
    }
}

/// Bookkeeping for `use_effect`.
#[derive(Clone, Default)]
pub struct EffectSlot {
    /// Dependencies of the last run. `None` means run after every pass.
    pub deps: Option<Deps>,
    pub has_run: bool,
    pub(crate) cleanup: Arc<Mutex<Option<Cleanup>>>,
}

impl EffectSlot {
    /// Take the pending cleanup, leaving none behind.
    pub(crate) fn take_cleanup(&self) -> Option<Cleanup> {
        self.cleanup.lock().take()
    }
}

impl fmt::Debug for EffectSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectSlot")
            .field("deps", &self.deps)
            .field("has_run", &self.has_run)
            .field("has_cleanup", &self.cleanup.lock().is_some())
            .finish()
    }
}

/// Memoized value for `use_memo` and `use_callback`.
#[derive(Clone)]
pub struct MemoSlot {
    pub deps: Deps,
    pub(crate) value: Arc<dyn Any + Send + Sync>,
}

struct Unset;

impl MemoSlot {
    /// Placeholder that no cached type can downcast to.
    pub(crate) fn unset() -> Self {
        Self {
            deps: Deps::new(),
            value: Arc::new(Unset),
        }
    }
}
