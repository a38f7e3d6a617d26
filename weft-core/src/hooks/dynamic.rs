//! Dynamic Attribute Callbacks
//!
//! A host forwards attribute changes to [`Context::attribute_changed`]. If a
//! handler is registered for that attribute, the value actually changed,
//! and the element still carries the attribute, the handler is called with
//! the attribute's current value.

use std::sync::Arc;

use super::context::Context;
use crate::error::isolate;

/// Called with the attribute's current value.
pub type DynamicHandler = Arc<dyn Fn(Option<&str>) + Send + Sync>;

impl Context {
    /// Register `handler` for `attribute`, replacing any earlier one.
    pub fn register_dynamic_callback(
        &self,
        attribute: impl Into<String>,
        handler: impl Fn(Option<&str>) + Send + Sync + 'static,
    ) {
        self.dynamic.insert(attribute.into(), Arc::new(handler));
    }

    /// Returns whether a handler was registered.
    pub fn unregister_dynamic_callback(&self, attribute: &str) -> bool {
        self.dynamic.remove(attribute).is_some()
    }

    /// Notify the context that `name` changed from `old` to `new`. Returns
    /// whether a handler ran.
    pub fn attribute_changed(&self, name: &str, old: Option<&str>, new: Option<&str>) -> bool {
        if old == new {
            return false;
        }
        let Some(handler) = self.dynamic.get(name).map(|entry| Arc::clone(entry.value())) else {
            return false;
        };
        let Some(attributes) = &self.attributes else {
            return false;
        };
        if !attributes.has_attribute(name) {
            return false;
        }

        let current = attributes.get_attribute(name);
        isolate("dynamic callback", || handler(current.as_deref()));
        true
    }
}
