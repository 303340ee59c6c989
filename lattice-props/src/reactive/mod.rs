//! Reactive Primitives
//!
//! This module implements the cells that back reactive fields: signals,
//! observable arrays and memos, plus the dependency tracking that connects
//! them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal holds one value. Reading it inside a tracking context registers it
//! as a dependency of that context. Replacing its value notifies subscribers.
//!
//! ## Observable Arrays
//!
//! An [`ArraySignal`] owns a native array and reports every mutation, whether
//! made through the signal or directly on the patched array, as change
//! records followed by a change notification.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes. Computed fields are memos.
//!
//! # Implementation Notes
//!
//! Dependency detection uses a thread-local tracking context. When a cell is
//! read, we check if there is an active tracking context and, if so, record
//! the cell in it. The memo subscribes to every recorded cell after its
//! computation returns.

mod array_signal;
mod cell;
mod context;
mod memo;
mod signal;
mod subscriber;

pub use array_signal::{ArraySignal, WeakArraySignal};
pub use cell::{mutate, set_at, CellId, CellRef, ReactiveCell};
pub use context::ReactiveContext;
pub use memo::{ComputeFn, Memo, MemoState, WriteFn};
pub use signal::Signal;
pub use subscriber::{Callback, Event, Payload, SubscriberId, Subscription};

pub(crate) use subscriber::SubscriberList;
