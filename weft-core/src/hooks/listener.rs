//! Event Listeners
//!
//! `use_event_listener` attaches a handler to an [`EventTarget`] once per
//! slot. The target only ever sees a trampoline; the trampoline reads the
//! handler from the slot on every dispatch, so re-rendering with a new
//! closure swaps the handler without detaching.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use super::context::Context;
use super::kind::{HookData, HookKind};
use crate::error::{isolate, HookError, Result};

/// Identity of one attached listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// An event delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub detail: Value,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detail: Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Something listeners can be attached to.
pub trait EventTarget: Send + Sync {
    fn add_event_listener(&self, event: &str, id: ListenerId, handler: EventHandler);
    fn remove_event_listener(&self, event: &str, id: ListenerId);
}

/// Payload of an event-listener hook.
#[derive(Clone)]
pub struct ListenerSlot {
    id: ListenerId,
    event: String,
    target: Arc<dyn EventTarget>,
    handler: Arc<RwLock<EventHandler>>,
}

impl ListenerSlot {
    pub(crate) fn new(target: Arc<dyn EventTarget>, event: &str, handler: EventHandler) -> Self {
        Self {
            id: ListenerId::next(),
            event: event.to_owned(),
            target,
            handler: Arc::new(RwLock::new(handler)),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub(crate) fn attach(&self) {
        let current = Arc::clone(&self.handler);
        let trampoline: EventHandler = Arc::new(move |event: &Event| {
            let handler = current.read().clone();
            isolate("event listener", || handler(event));
        });
        self.target.add_event_listener(&self.event, self.id, trampoline);
    }

    pub(crate) fn detach(&self) {
        self.target.remove_event_listener(&self.event, self.id);
    }

    pub(crate) fn replace_handler(&self, handler: EventHandler) {
        *self.handler.write() = handler;
    }

    /// Whether this slot is attached to `event` on `target`.
    pub(crate) fn same_binding(&self, target: &Arc<dyn EventTarget>, event: &str) -> bool {
        self.event == event
            && Arc::as_ptr(&self.target) as *const () == Arc::as_ptr(target) as *const ()
    }
}

impl fmt::Debug for ListenerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSlot")
            .field("id", &self.id)
            .field("event", &self.event)
            .finish()
    }
}

/// In-process [`EventTarget`].
///
/// Listeners for each event name are kept in attach order.
#[derive(Default)]
pub struct EventHub {
    listeners: DashMap<String, IndexMap<ListenerId, EventHandler>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every listener attached to its name. Returns the
    /// number of listeners called.
    pub fn dispatch(&self, event: &Event) -> usize {
        let handlers: Vec<EventHandler> = self
            .listeners
            .get(&event.name)
            .map(|entry| entry.values().cloned().collect())
            .unwrap_or_default();
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, |entry| entry.len())
    }
}

impl EventTarget for EventHub {
    fn add_event_listener(&self, event: &str, id: ListenerId, handler: EventHandler) {
        self.listeners
            .entry(event.to_owned())
            .or_default()
            .insert(id, handler);
    }

    fn remove_event_listener(&self, event: &str, id: ListenerId) {
        if let Some(mut entry) = self.listeners.get_mut(event) {
            entry.shift_remove(&id);
        }
    }
}

impl Context {
    /// Attach `handler` to `event` on `target`.
    ///
    /// The listener is attached on the first pass only. Later passes swap
    /// in the new handler; a different target or event name detaches the
    /// old listener and attaches a new one.
    pub fn use_event_listener<F>(
        &self,
        target: Arc<dyn EventTarget>,
        event: &str,
        handler: F,
    ) -> Result<ListenerId>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        let mut created = false;
        let handle = self.registry.create_with(HookKind::EventListener, || {
            created = true;
            HookData::Listener(ListenerSlot::new(Arc::clone(&target), event, Arc::clone(&handler)))
        })?;

        let slot = match self.slot(handle)? {
            HookData::Listener(slot) => slot,
            other => {
                return Err(HookError::PayloadMismatch {
                    kind: HookKind::EventListener,
                    found: other.shape(),
                })
            }
        };

        if created {
            slot.attach();
            return Ok(slot.id());
        }
        if slot.same_binding(&target, event) {
            slot.replace_handler(handler);
            return Ok(slot.id());
        }

        slot.detach();
        let rebound = ListenerSlot::new(target, event, handler);
        self.registry
            .write(handle, HookData::Listener(rebound.clone()))?;
        rebound.attach();
        tracing::debug!(event, listener = rebound.id().raw(), "event listener re-attached");
        Ok(rebound.id())
    }
}
