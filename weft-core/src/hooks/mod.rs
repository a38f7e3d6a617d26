//! Call-Order Hooks
//!
//! Hooks give a render function that is re-run from scratch persistent state
//! between runs. Identity is positional: inside a frame, the n-th hook call
//! of every pass resolves to the same registry slot.
//!
//! # How Hooks Work
//!
//! 1. The host calls [`Context::with_frame`] once per render pass
//! 2. Each `use_*` call claims the frame's next position
//! 3. On the first pass the position is empty and a record is created; on
//!    later passes the existing record is returned
//! 4. When the pass returns, queued effects run
//!
//! Hook calls must therefore happen in the same order on every pass. A call
//! that lands on a slot of another kind fails with
//! [`HookError::HookKindMismatch`](crate::HookError::HookKindMismatch).
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use weft_core::hooks::{Context, HookRegistry};
//!
//! let cx = Context::builder(Arc::new(HookRegistry::new())).build();
//!
//! let render = |cx: &Context| -> weft_core::Result<_> {
//!     let (clicks, set_clicks) = cx.use_state(0_u32)?;
//!     let id = cx.use_id()?;
//!     Ok((clicks, set_clicks, id))
//! };
//!
//! let (clicks, set_clicks, id) = cx.with_frame("button", render).unwrap();
//! assert_eq!((clicks, id.as_str()), (0, "weft-1"));
//! set_clicks.update(|n| n + 1).unwrap();
//!
//! let (clicks, _, id) = cx.with_frame("button", render).unwrap();
//! assert_eq!((clicks, id.as_str()), (1, "weft-1"));
//! ```

mod context;
mod dynamic;
mod effect;
mod frame;
mod kind;
mod listener;
mod media;
mod registry;
mod state;
mod storage;
mod transition;

pub use context::{AttributeSource, Context, ContextBuilder, MediaQueryList, RenderTrigger};
pub use dynamic::DynamicHandler;
pub use frame::{Frame, FrameId, FrameManager, FrameOptions, FrameReport};
pub use kind::{Cleanup, Deps, EffectSlot, HookData, HookKind, MemoSlot};
pub use listener::{Event, EventHandler, EventHub, EventTarget, ListenerId, ListenerSlot};
pub use registry::{FrameSlot, HookHandle, HookIndex, HookRecord, HookRegistry};
pub use state::{Dispatch, StateSetter};
pub use storage::{MemoryStorage, Storage, StorageSetter};
pub use transition::Transition;
