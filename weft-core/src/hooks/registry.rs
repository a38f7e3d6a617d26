//! Hook Registry
//!
//! The registry maps a monotonically increasing [`HookIndex`] to a
//! [`HookRecord`], keeps a secondary index by [`HookKind`], and owns the
//! [`FrameManager`] that gives hook calls their positional identity.
//!
//! # Locking
//!
//! Structural changes (create on a miss, write, patch, destroy, frame
//! start/end/clear) go through the registry's [`CoopMutex`] with
//! `try_acquire`, failing with [`HookError::LockContention`] rather than
//! waiting. [`HookRegistry::write_queued`] is the one mutator that waits its
//! turn. Reads never touch the mutex.
//!
//! The registry never calls user code while holding the mutex.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use indexmap::IndexSet;
use parking_lot::RwLock;
use serde_json::Value;

use super::frame::{FrameId, FrameManager, FrameOptions, FrameReport};
use super::kind::{HookData, HookKind};
use crate::error::{HookError, Result};
use crate::sync::{CoopMutex, LockGuard};

/// Globally unique, immutable identity of a hook record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookIndex(u64);

impl HookIndex {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for HookIndex {
    fn from(index: u64) -> Self {
        Self(index)
    }
}

impl fmt::Display for HookIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lightweight accessor for one registry slot.
///
/// A handle holds no data; every access re-reads the registry, so copies
/// of a handle can never go stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookHandle {
    kind: HookKind,
    index: HookIndex,
}

impl HookHandle {
    pub fn new(kind: HookKind, index: HookIndex) -> Self {
        Self { kind, index }
    }

    pub fn kind(&self) -> HookKind {
        self.kind
    }

    pub fn index(&self) -> HookIndex {
        self.index
    }

    pub fn get(&self, registry: &HookRegistry) -> Option<HookData> {
        registry.read(*self)
    }

    pub fn set(&self, registry: &HookRegistry, data: HookData) -> Result<()> {
        registry.write(*self, data)
    }

    pub fn patch(&self, registry: &HookRegistry, partial: Value) -> Result<()> {
        registry.patch(*self, partial)
    }

    pub fn destroy(&self, registry: &HookRegistry) -> Result<HookData> {
        registry.destroy(*self)
    }
}

/// Where a frame-owned record sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSlot {
    pub frame: FrameId,
    pub position: usize,
}

/// A hook's registry entry.
#[derive(Debug, Clone)]
pub struct HookRecord {
    pub kind: HookKind,
    pub index: HookIndex,
    pub data: HookData,
    pub created_at: Instant,
    pub slot: Option<FrameSlot>,
}

struct HookTable {
    next_index: u64,
    records: HashMap<HookIndex, HookRecord>,
    by_kind: HashMap<HookKind, IndexSet<HookIndex>>,
}

impl Default for HookTable {
    fn default() -> Self {
        Self {
            next_index: 1,
            records: HashMap::new(),
            by_kind: HashMap::new(),
        }
    }
}

/// Process-wide hook storage, injected wherever hooks are resolved.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use weft_core::hooks::{HookKind, HookRegistry};
///
/// let registry = HookRegistry::new();
/// let handle = registry.create(HookKind::State, json!({"value": 0}).into()).unwrap();
/// registry.patch(handle, json!({"value": 1})).unwrap();
/// assert_eq!(registry.read(handle).unwrap().as_value(), Some(&json!({"value": 1})));
/// ```
#[derive(Default)]
pub struct HookRegistry {
    lock: CoopMutex,
    table: RwLock<HookTable>,
    frames: FrameManager,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Create a record, or reuse the one bound at the active frame's next
    /// position.
    pub fn create(&self, kind: HookKind, data: HookData) -> Result<HookHandle> {
        self.create_with(kind, || data)
    }

    /// Like [`create`](Self::create), but only builds the payload when a new
    /// record is actually needed. `init` runs before the lock is taken.
    pub fn create_with(&self, kind: HookKind, init: impl FnOnce() -> HookData) -> Result<HookHandle> {
        let Some(claim) = self.frames.claim() else {
            let data = init();
            let _guard = self.guard()?;
            return self.insert(kind, data, None);
        };

        if let Some(existing) = claim.existing {
            if existing.kind != kind {
                return Err(HookError::HookKindMismatch {
                    frame: claim.frame,
                    position: claim.position,
                    expected: kind,
                    found: existing.kind,
                });
            }
            if self.contains(existing) {
                tracing::trace!(frame = %claim.frame, position = claim.position, %kind, "hook reused");
                return Ok(existing);
            }
        }

        let data = init();
        let _guard = self.guard()?;
        let slot = FrameSlot {
            frame: claim.frame.clone(),
            position: claim.position,
        };
        let handle = self.insert(kind, data, Some(slot))?;
        self.frames.bind(&claim.frame, claim.position, handle);
        Ok(handle)
    }

    /// Current payload, or `None` if the record was destroyed.
    pub fn read(&self, handle: HookHandle) -> Option<HookData> {
        self.table
            .read()
            .records
            .get(&handle.index)
            .map(|record| record.data.clone())
    }

    /// Full record including metadata.
    pub fn record(&self, handle: HookHandle) -> Option<HookRecord> {
        self.table.read().records.get(&handle.index).cloned()
    }

    pub fn contains(&self, handle: HookHandle) -> bool {
        self.table.read().records.contains_key(&handle.index)
    }

    /// Replace a record's payload.
    pub fn write(&self, handle: HookHandle, data: HookData) -> Result<()> {
        let _guard = self.guard()?;
        self.replace(handle, data)
    }

    /// Replace a record's payload, waiting for the lock instead of failing.
    pub async fn write_queued(&self, handle: HookHandle, data: HookData) -> Result<()> {
        let _guard = self.lock.acquire().await;
        self.replace(handle, data)
    }

    /// Shallow-merge `partial` into a JSON object payload.
    pub fn patch(&self, handle: HookHandle, partial: Value) -> Result<()> {
        let _guard = self.guard()?;
        let Value::Object(fields) = partial else {
            return Err(HookError::InvalidPatchTarget { index: handle.index });
        };

        let mut table = self.table.write();
        let record = table
            .records
            .get_mut(&handle.index)
            .ok_or(HookError::HookNotFound(handle.index))?;
        match &mut record.data {
            HookData::Value(Value::Object(target)) => {
                target.extend(fields);
                Ok(())
            }
            _ => Err(HookError::InvalidPatchTarget { index: handle.index }),
        }
    }

    /// Remove a record, returning its final payload.
    pub fn destroy(&self, handle: HookHandle) -> Result<HookData> {
        let _guard = self.guard()?;
        self.remove(handle.index)
    }

    /// Payloads of every live record of `kind`, oldest first.
    pub fn lookup_by_kind(&self, kind: HookKind) -> Vec<HookData> {
        let table = self.table.read();
        table
            .by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .filter_map(|index| table.records.get(index))
            .map(|record| record.data.clone())
            .collect()
    }

    /// Handles of every live record of `kind`, oldest first.
    pub fn handles_by_kind(&self, kind: HookKind) -> Vec<HookHandle> {
        self.table
            .read()
            .by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .map(|index| HookHandle::new(kind, *index))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ------------------------------------------------------------------
    // Frames
    // ------------------------------------------------------------------

    pub fn start_frame(&self, id: impl Into<FrameId>, options: FrameOptions) -> Result<()> {
        let id = id.into();
        let _guard = self.guard()?;
        let render_count = self.frames.start(id.clone(), options)?;
        tracing::debug!(frame = %id, render_count, "frame started");
        Ok(())
    }

    pub fn end_frame(&self) -> Result<FrameReport> {
        let _guard = self.guard()?;
        let report = self.frames.end()?;
        tracing::debug!(
            frame = %report.id,
            hooks = report.hooks_touched,
            "frame ended"
        );
        Ok(report)
    }

    /// Run `f` inside frame `id`. The frame is ended on every exit path,
    /// including errors and panics.
    pub fn with_frame<R>(
        &self,
        id: impl Into<FrameId>,
        options: FrameOptions,
        f: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        self.start_frame(id, options)?;
        let mut scope = FrameScope {
            registry: self,
            open: true,
        };
        let result = f();
        scope.open = false;
        let ended = self.end_frame().or_else(|err| {
            self.force_end_frame(&err);
            Err(err)
        });
        match (result, ended) {
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(err),
            (Ok(value), Ok(_)) => Ok(value),
        }
    }

    /// Destroy every record owned by frame `id` and forget the frame.
    ///
    /// Returns the removed payloads, in position order, so the caller can
    /// run teardown for them. Unknown ids are a no-op.
    pub fn clear_frame(&self, id: impl Into<FrameId>) -> Result<Vec<HookData>> {
        let id = id.into();
        let _guard = self.guard()?;
        let Some(frame) = self.frames.remove(&id)? else {
            return Ok(Vec::new());
        };

        let removed: Vec<HookData> = frame
            .hooks()
            .filter_map(|(_, handle)| self.remove(handle.index).ok())
            .collect();
        tracing::debug!(frame = %id, hooks = removed.len(), "frame cleared");
        Ok(removed)
    }

    pub fn active_frame(&self) -> Option<FrameId> {
        self.frames.active()
    }

    pub fn frames(&self) -> &FrameManager {
        &self.frames
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn guard(&self) -> Result<LockGuard<'_>> {
        self.lock.try_acquire().ok_or(HookError::LockContention)
    }

    /// Clear the active pointer without the mutex. Used when a frame must
    /// be closed but the lock is unavailable.
    fn force_end_frame(&self, reason: &HookError) {
        if let Ok(report) = self.frames.end() {
            tracing::warn!(frame = %report.id, %reason, "frame force-ended");
        }
    }

    fn insert(&self, kind: HookKind, data: HookData, slot: Option<FrameSlot>) -> Result<HookHandle> {
        if !kind.accepts(&data) {
            return Err(HookError::PayloadMismatch {
                kind,
                found: data.shape(),
            });
        }

        let mut table = self.table.write();
        let index = HookIndex(table.next_index);
        table.next_index += 1;
        table.by_kind.entry(kind).or_default().insert(index);
        table.records.insert(
            index,
            HookRecord {
                kind,
                index,
                data,
                created_at: Instant::now(),
                slot,
            },
        );
        tracing::trace!(index = index.0, %kind, "hook created");
        Ok(HookHandle { kind, index })
    }

    fn replace(&self, handle: HookHandle, data: HookData) -> Result<()> {
        let mut table = self.table.write();
        let record = table
            .records
            .get_mut(&handle.index)
            .ok_or(HookError::HookNotFound(handle.index))?;
        if !record.kind.accepts(&data) {
            return Err(HookError::PayloadMismatch {
                kind: record.kind,
                found: data.shape(),
            });
        }
        record.data = data;
        Ok(())
    }

    fn remove(&self, index: HookIndex) -> Result<HookData> {
        let mut table = self.table.write();
        let record = table
            .records
            .remove(&index)
            .ok_or(HookError::HookNotFound(index))?;
        if let Some(indices) = table.by_kind.get_mut(&record.kind) {
            indices.shift_remove(&index);
        }
        Ok(record.data)
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("records", &self.len())
            .field("frames", &self.frames.len())
            .field("active_frame", &self.active_frame())
            .field("lock", &self.lock)
            .finish()
    }
}

/// Ends the frame if `with_frame`'s closure unwinds.
struct FrameScope<'a> {
    registry: &'a HookRegistry,
    open: bool,
}

impl Drop for FrameScope<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(err) = self.registry.end_frame() {
                self.registry.force_end_frame(&err);
            }
        }
    }
}
