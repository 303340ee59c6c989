//! The primitive cell contract.
//!
//! Everything that can back a reactive field implements [`ReactiveCell`]:
//! the built-in [`Signal`](super::Signal), [`ArraySignal`](super::ArraySignal)
//! and [`Memo`](super::Memo), and every wrapper an extender produces.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::array_signal::ArraySignal;
use super::subscriber::{Callback, Event, Subscription};
use crate::error::{Error, Result};
use crate::value::Value;

/// Unique identifier of a cell. Persists across value reassignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(u64);

impl CellId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for CellId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

/// A single observable slot.
pub trait ReactiveCell: Send + Sync {
    fn id(&self) -> CellId;

    /// Current value. Registers the cell with the running computation.
    fn read(&self) -> Value;

    /// Like [`read`](Self::read), but surfaces a failed computation.
    fn try_read(&self) -> Result<Value> {
        Ok(self.read())
    }

    /// Current value, without dependency tracking.
    fn peek(&self) -> Value;

    fn write(&self, value: Value) -> Result<()>;

    /// Register `callback` on one notification channel.
    ///
    /// Fails with [`Error::InvalidMutationTarget`] when `event` is
    /// [`Event::ArrayChange`] and the cell is not an observable array.
    fn subscribe(&self, event: Event, callback: Callback) -> Result<Subscription>;

    /// Signal a change without writing (`valueHasMutated`).
    fn notify(&self);

    /// The observable array behind this cell, if there is one.
    fn as_array(&self) -> Option<ArraySignal> {
        None
    }

    /// Name used in error messages.
    fn name(&self) -> String {
        self.id().to_string()
    }
}

/// Shared handle to any cell.
pub type CellRef = Arc<dyn ReactiveCell>;

/// Run `f` over the raw items of an array cell, as one notification batch.
pub fn mutate(cell: &CellRef, f: impl FnOnce(&mut Vec<Value>)) -> Result<()> {
    let array = cell
        .as_array()
        .ok_or_else(|| Error::invalid_target(cell.name(), "mutate"))?;
    array.mutate(f)
}

/// Replace the element at `index` of an array cell, returning the old one.
pub fn set_at(cell: &CellRef, index: usize, value: Value) -> Result<Value> {
    let array = cell
        .as_array()
        .ok_or_else(|| Error::invalid_target(cell.name(), "set"))?;
    array.set(index, value)
}
