//! Frames
//!
//! A frame binds the sequence of hook calls made during one render pass to
//! a stable caller identity. On every pass the cursor restarts at zero and
//! each hook call claims the next position, so the n-th call of a pass
//! lands on the same registry slot as the n-th call of every earlier pass.
//!
//! # State Machine
//!
//! ```text
//! NoFrame --start--> FrameActive --end--> NoFrame
//! ```
//!
//! Only one frame can be active at a time; starting a second one is a
//! [`HookError::FrameReentrancy`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::registry::HookHandle;
use crate::error::{HookError, Result};

/// Stable identity of one logical component instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(Arc<str>);

impl FrameId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FrameId {
    fn from(id: &str) -> Self {
        Self(Arc::from(id))
    }
}

impl From<String> for FrameId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

/// Per-frame settings, replaced on every `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameOptions {
    /// Human-readable name used in log output.
    pub label: Option<String>,
    /// Log a warning when a pass touches a different number of hooks than
    /// the previous pass of the same frame.
    pub warn_on_hook_count_change: bool,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            label: None,
            warn_on_hook_count_change: true,
        }
    }
}

/// One caller's hook slots and pass statistics.
#[derive(Debug, Clone)]
pub struct Frame {
    id: FrameId,
    created_at: Instant,
    last_used_at: Instant,
    hooks: BTreeMap<usize, HookHandle>,
    render_count: u64,
    cursor: usize,
    last_hook_count: Option<usize>,
    is_active: bool,
    options: FrameOptions,
}

impl Frame {
    fn new(id: FrameId, options: FrameOptions) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_used_at: now,
            hooks: BTreeMap::new(),
            render_count: 0,
            cursor: 0,
            last_hook_count: None,
            is_active: false,
            options,
        }
    }

    pub fn id(&self) -> &FrameId {
        &self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    /// Handle bound at `position`, if that position was ever reached.
    pub fn hook(&self, position: usize) -> Option<HookHandle> {
        self.hooks.get(&position).copied()
    }

    pub fn hooks(&self) -> impl Iterator<Item = (usize, HookHandle)> + '_ {
        self.hooks.iter().map(|(position, handle)| (*position, *handle))
    }

    pub fn render_count(&self) -> u64 {
        self.render_count
    }

    /// Hooks touched by the most recently completed pass.
    pub fn last_hook_count(&self) -> Option<usize> {
        self.last_hook_count
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn options(&self) -> &FrameOptions {
        &self.options
    }
}

/// Summary returned when a pass ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub id: FrameId,
    pub render_count: u64,
    pub hooks_touched: usize,
}

/// Position claimed by one hook call in the active frame.
#[derive(Debug, Clone)]
pub(crate) struct SlotClaim {
    pub frame: FrameId,
    pub position: usize,
    pub existing: Option<HookHandle>,
}

#[derive(Default)]
struct FrameTable {
    frames: IndexMap<FrameId, Frame>,
    active: Option<FrameId>,
}

/// Tracks every frame and which one, if any, is active.
///
/// The manager only keeps positions; the records themselves live in the
/// [`HookRegistry`](super::HookRegistry), which drives these methods while
/// holding its mutex.
#[derive(Default)]
pub struct FrameManager {
    table: Mutex<FrameTable>,
}

impl FrameManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn start(&self, id: FrameId, options: FrameOptions) -> Result<u64> {
        let mut table = self.table.lock();
        if let Some(active) = &table.active {
            return Err(HookError::FrameReentrancy {
                active: active.clone(),
                requested: id,
            });
        }

        let frame = table
            .frames
            .entry(id.clone())
            .or_insert_with(|| Frame::new(id.clone(), options.clone()));
        frame.render_count += 1;
        frame.cursor = 0;
        frame.is_active = true;
        frame.last_used_at = Instant::now();
        frame.options = options;
        let render_count = frame.render_count;

        table.active = Some(id);
        Ok(render_count)
    }

    pub(crate) fn end(&self) -> Result<FrameReport> {
        let mut table = self.table.lock();
        let id = table.active.take().ok_or(HookError::NoActiveFrame)?;
        let frame = table
            .frames
            .get_mut(&id)
            .ok_or(HookError::NoActiveFrame)?;

        frame.is_active = false;
        let touched = frame.cursor;
        if let Some(previous) = frame.last_hook_count {
            if previous != touched && frame.options.warn_on_hook_count_change {
                tracing::warn!(
                    frame = %id,
                    label = frame.options.label.as_deref().unwrap_or(""),
                    previous,
                    touched,
                    "hook count changed between passes; hook calls must not be conditional"
                );
            }
        }
        frame.last_hook_count = Some(touched);

        Ok(FrameReport {
            id,
            render_count: frame.render_count,
            hooks_touched: touched,
        })
    }

    /// Claim the next position of the active frame, advancing its cursor.
    pub(crate) fn claim(&self) -> Option<SlotClaim> {
        let mut table = self.table.lock();
        let id = table.active.clone()?;
        let frame = table.frames.get_mut(&id)?;
        let position = frame.cursor;
        frame.cursor += 1;
        Some(SlotClaim {
            frame: id,
            position,
            existing: frame.hooks.get(&position).copied(),
        })
    }

    pub(crate) fn bind(&self, frame: &FrameId, position: usize, handle: HookHandle) {
        if let Some(frame) = self.table.lock().frames.get_mut(frame) {
            frame.hooks.insert(position, handle);
        }
    }

    /// Remove an inactive frame, returning it so its hooks can be destroyed.
    pub(crate) fn remove(&self, id: &FrameId) -> Result<Option<Frame>> {
        let mut table = self.table.lock();
        if table.active.as_ref() == Some(id) {
            return Err(HookError::FrameInUse(id.clone()));
        }
        Ok(table.frames.shift_remove(id))
    }

    pub fn active(&self) -> Option<FrameId> {
        self.table.lock().active.clone()
    }

    pub fn frame(&self, id: &FrameId) -> Option<Frame> {
        self.table.lock().frames.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
