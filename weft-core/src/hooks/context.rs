//! Render Context
//!
//! A [`Context`] is what a host hands to its render functions. It wraps the
//! shared [`HookRegistry`] together with the collaborators hooks talk to:
//!
//! - a render trigger, called whenever a hook changes state that should be
//!   reflected on screen
//! - an [`AttributeSource`] for dynamic attribute callbacks
//! - a [`MediaQueryList`] for `use_media_query`
//! - a [`Storage`] backend for `use_storage`
//!
//! # Render Passes
//!
//! ```rust
//! use std::sync::Arc;
//! use weft_core::hooks::{Context, HookRegistry};
//!
//! let cx = Context::builder(Arc::new(HookRegistry::new())).build();
//!
//! let (count, set_count) = cx.with_frame("counter", |cx| cx.use_state(0)).unwrap();
//! assert_eq!(count, 0);
//! set_count.set(5).unwrap();
//!
//! let (count, _) = cx.with_frame("counter", |cx| cx.use_state(0)).unwrap();
//! assert_eq!(count, 5);
//! ```
//!
//! Effects queued during a pass run only after the pass returns `Ok`.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::json;

use super::dynamic::DynamicHandler;
use super::effect::PendingEffect;
use super::frame::{FrameId, FrameOptions};
use super::kind::{HookData, HookKind};
use super::registry::{HookHandle, HookIndex, HookRegistry};
use super::storage::{MemoryStorage, Storage};
use crate::config::Config;
use crate::error::{isolate, HookError, Result};

/// Asks the host to run another render pass.
pub type RenderTrigger = Arc<dyn Fn() + Send + Sync>;

/// Read access to the host element's attributes.
pub trait AttributeSource: Send + Sync {
    fn has_attribute(&self, name: &str) -> bool;
    fn get_attribute(&self, name: &str) -> Option<String>;
}

/// Evaluates media queries against the host environment.
pub trait MediaQueryList: Send + Sync {
    fn matches(&self, query: &str) -> bool;
}

pub(crate) fn request_render(trigger: &Option<RenderTrigger>) {
    if let Some(trigger) = trigger {
        isolate("render trigger", || trigger());
    }
}

/// Hook entry point for one host.
pub struct Context {
    pub(super) registry: Arc<HookRegistry>,
    pub(super) render_trigger: Option<RenderTrigger>,
    pub(super) attributes: Option<Arc<dyn AttributeSource>>,
    pub(super) media_queries: Option<Arc<dyn MediaQueryList>>,
    pub(super) storage: Arc<dyn Storage>,
    pub(super) config: Config,
    pub(super) pending_effects: Mutex<Vec<PendingEffect>>,
    pub(super) reducers: DashMap<HookIndex, Arc<dyn Any + Send + Sync>>,
    pub(super) dynamic: DashMap<String, DynamicHandler>,
    next_id: AtomicU64,
}

impl Context {
    pub fn builder(registry: Arc<HookRegistry>) -> ContextBuilder {
        ContextBuilder {
            registry,
            render_trigger: None,
            attributes: None,
            media_queries: None,
            storage: None,
            config: Config::default(),
        }
    }

    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one render pass of frame `id` with the configured frame options.
    pub fn with_frame<R>(
        &self,
        id: impl Into<FrameId>,
        f: impl FnOnce(&Context) -> Result<R>,
    ) -> Result<R> {
        self.with_frame_options(id, self.config.frame.clone(), f)
    }

    /// Run one render pass of frame `id`.
    ///
    /// On success the effects queued by the pass are flushed. On failure
    /// they are dropped without running; effects queued before the pass
    /// started stay queued.
    pub fn with_frame_options<R>(
        &self,
        id: impl Into<FrameId>,
        options: FrameOptions,
        f: impl FnOnce(&Context) -> Result<R>,
    ) -> Result<R> {
        let mark = self.pending_effects.lock().len();
        match self.registry.with_frame(id, options, || f(self)) {
            Ok(value) => {
                self.flush_effects()?;
                Ok(value)
            }
            Err(err) => {
                let discarded = {
                    let mut pending = self.pending_effects.lock();
                    let queued = pending.len().saturating_sub(mark);
                    pending.truncate(mark);
                    queued
                };
                if discarded > 0 {
                    tracing::debug!(discarded, %err, "render pass failed; effects discarded");
                }
                Err(err)
            }
        }
    }

    /// Tear down frame `id`: run its effect cleanups, detach its event
    /// listeners, and remove its records. Returns the number of records
    /// removed.
    pub fn clear_frame(&self, id: impl Into<FrameId>) -> Result<usize> {
        let id = id.into();
        let owned: Vec<HookHandle> = self
            .registry
            .frames()
            .frame(&id)
            .map(|frame| frame.hooks().map(|(_, handle)| handle).collect())
            .unwrap_or_default();

        let removed = self.registry.clear_frame(id)?;
        for handle in owned.iter().filter(|h| h.kind() == HookKind::Reducer) {
            self.reducers.remove(&handle.index());
        }
        for data in &removed {
            match data {
                HookData::Effect(slot) => {
                    if let Some(cleanup) = slot.take_cleanup() {
                        isolate("effect cleanup", cleanup);
                    }
                }
                HookData::Listener(slot) => slot.detach(),
                _ => {}
            }
        }
        Ok(removed.len())
    }

    /// A stable id, unique within this context: the configured prefix
    /// followed by a counter.
    pub fn use_id(&self) -> Result<String> {
        let handle = self.registry.create_with(HookKind::Id, || {
            let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            json!(format!("{}{}", self.config.id_prefix, n)).into()
        })?;
        let data = self.slot(handle)?;
        data.as_value()
            .and_then(|value| value.as_str())
            .map(str::to_owned)
            .ok_or(HookError::PayloadMismatch {
                kind: HookKind::Id,
                found: data.shape(),
            })
    }

    pub(crate) fn slot(&self, handle: HookHandle) -> Result<HookData> {
        self.registry
            .read(handle)
            .ok_or(HookError::HookNotFound(handle.index()))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("pending_effects", &self.pending_effects.lock().len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Context`].
pub struct ContextBuilder {
    registry: Arc<HookRegistry>,
    render_trigger: Option<RenderTrigger>,
    attributes: Option<Arc<dyn AttributeSource>>,
    media_queries: Option<Arc<dyn MediaQueryList>>,
    storage: Option<Arc<dyn Storage>>,
    config: Config,
}

impl ContextBuilder {
    pub fn render_trigger(mut self, trigger: impl Fn() + Send + Sync + 'static) -> Self {
        self.render_trigger = Some(Arc::new(trigger));
        self
    }

    pub fn attributes(mut self, attributes: Arc<dyn AttributeSource>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn media_queries(mut self, media_queries: Arc<dyn MediaQueryList>) -> Self {
        self.media_queries = Some(media_queries);
        self
    }

    /// Backend for `use_storage`. Defaults to an in-memory store.
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Context {
        Context {
            registry: self.registry,
            render_trigger: self.render_trigger,
            attributes: self.attributes,
            media_queries: self.media_queries,
            storage: self
                .storage
                .unwrap_or_else(|| Arc::new(MemoryStorage::new())),
            config: self.config,
            pending_effects: Mutex::new(Vec::new()),
            reducers: DashMap::new(),
            dynamic: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }
}
