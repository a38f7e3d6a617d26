//! Keyed Storage Hook
//!
//! `use_storage` mirrors a value kept in a [`Storage`] backend. Values are
//! written to the backend as MessagePack and mirrored into the hook slot as
//! JSON, so reading the current value never touches the backend.
//!
//! A stored value that fails to decode is replaced by the default and
//! logged.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::context::{request_render, Context, RenderTrigger};
use super::kind::HookKind;
use super::registry::{HookHandle, HookRegistry};
use crate::error::{HookError, Result};

/// Byte-oriented key/value store outliving the process's render passes.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, value: Vec<u8>);
    fn remove(&self, key: &str);
}

/// In-process [`Storage`]. Data lives as long as the value.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: &str, value: Vec<u8>) {
        self.entries.insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// Persists new values for a `use_storage` slot.
pub struct StorageSetter<T> {
    registry: Arc<HookRegistry>,
    storage: Arc<dyn Storage>,
    handle: HookHandle,
    key: String,
    trigger: Option<RenderTrigger>,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for StorageSetter<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            storage: Arc::clone(&self.storage),
            handle: self.handle,
            key: self.key.clone(),
            trigger: self.trigger.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> fmt::Debug for StorageSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSetter")
            .field("key", &self.key)
            .field("handle", &self.handle)
            .finish()
    }
}

impl<T: Serialize + DeserializeOwned> StorageSetter<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Write `value` to the backend and the slot, then request a render.
    pub fn set(&self, value: T) -> Result<()> {
        let bytes = rmp_serde::to_vec(&value)?;
        let mirrored = serde_json::to_value(&value)?;
        self.storage.set(&self.key, bytes);
        self.registry.patch(self.handle, json!({ "value": mirrored }))?;
        request_render(&self.trigger);
        Ok(())
    }

    /// Drop the key from the backend. The slot keeps its current value.
    pub fn remove(&self) {
        self.storage.remove(&self.key);
    }
}

impl Context {
    /// Value stored under `key`, or `default` when the backend has none.
    pub fn use_storage<T>(&self, key: &str, default: T) -> Result<(T, StorageSetter<T>)>
    where
        T: Serialize + DeserializeOwned,
    {
        let handle = self.registry.create_with(HookKind::Storage, || {
            json!({ "key": key, "value": Value::Null, "loaded": false }).into()
        })?;
        let data = self.slot(handle)?;
        let payload = data.as_value().ok_or(HookError::PayloadMismatch {
            kind: HookKind::Storage,
            found: data.shape(),
        })?;

        let loaded = payload.get("loaded").and_then(Value::as_bool) == Some(true);
        let same_key = payload.get("key").and_then(Value::as_str) == Some(key);
        let value = if loaded && same_key {
            let mirrored = payload.get("value").cloned().unwrap_or(Value::Null);
            serde_json::from_value(mirrored)?
        } else {
            let value = self.load(key, default);
            self.registry.patch(
                handle,
                json!({ "key": key, "value": serde_json::to_value(&value)?, "loaded": true }),
            )?;
            value
        };

        let setter = StorageSetter {
            registry: Arc::clone(&self.registry),
            storage: Arc::clone(&self.storage),
            handle,
            key: key.to_owned(),
            trigger: self.render_trigger.clone(),
            _value: PhantomData,
        };
        Ok((value, setter))
    }

    fn load<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(bytes) = self.storage.get(key) else {
            return default;
        };
        match rmp_serde::from_slice(&bytes) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, %err, "stored value could not be decoded; using default");
                default
            }
        }
    }
}
