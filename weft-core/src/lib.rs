//! Weft Core
//!
//! This crate provides the state runtime for the Weft component framework.
//! It implements:
//!
//! - Call-order hooks (state, reducer, ref, effect, memo, callback, media
//!   query, event listener, transition, storage, id)
//! - Fine-grained reactive primitives (signals, computeds, watchers)
//! - A cooperative mutex guarding the hook registry
//!
//! Rendering, element lifecycle and everything else that touches a real
//! document live in the host. The host talks to this crate through two
//! contracts: it opens a frame around every render pass, and it supplies a
//! render trigger that hooks call when their state changes.
//!
//! # Architecture
//!
//! - `hooks`: hook registry, frames, render context and the `use_*` hooks
//! - `reactive`: signals, computeds, watchers and the microtask queue
//! - `sync`: the cooperative mutex
//! - `config`: runtime settings
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicI32, Ordering};
//! use std::sync::Arc;
//! use weft_core::reactive::{flush_microtasks, Computed, Signal, Watcher};
//!
//! // Create a signal
//! let count = Signal::new(1);
//!
//! // Create a derived value
//! let source = count.clone();
//! let doubled = Computed::new(move || source.get() * 2);
//!
//! // Create a watcher; it runs once immediately
//! let seen = Arc::new(AtomicI32::new(0));
//! let sink = seen.clone();
//! let reader = doubled.clone();
//! let _watcher = Watcher::new(move || sink.store(reader.get(), Ordering::SeqCst));
//! assert_eq!(seen.load(Ordering::SeqCst), 2);
//!
//! // Update the signal; the watcher re-runs on the next flush
//! count.set(5);
//! flush_microtasks();
//! assert_eq!(seen.load(Ordering::SeqCst), 10);
//! ```

pub mod config;
pub mod hooks;
pub mod reactive;
pub mod sync;

mod error;

pub use config::Config;
pub use error::{HookError, Result};
