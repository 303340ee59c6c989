//! Observable Arrays
//!
//! An [`ArraySignal`] is the reactive cell behind an array-typed field. It
//! owns exactly one backing [`ArrayRef`] at a time and patches it, so that
//! mutators called on the raw array are routed back here.
//!
//! # Mutation Protocol
//!
//! Every operation is bracketed:
//!
//! 1. `value_will_mutate()` snapshots the elements and emits `BeforeChange`.
//! 2. The operation runs natively on the backing array under a
//!    [`NativeGuard`](crate::array::NativeGuard).
//! 3. `value_has_mutated()` diffs the snapshot against the new elements,
//!    emits `ArrayChange` (only if someone listens and something changed),
//!    then `Change`.
//!
//! Brackets nest; only the outermost pair notifies. That is how
//! [`ArraySignal::mutate`] turns many raw writes into one notification.
//!
//! # Sharing
//!
//! An array that is already patched into some signal is never attached to a
//! second one: it is copied first, so the two fields cannot see each other's
//! mutations. An array displaced by reassignment is stripped.

use std::cmp::Ordering;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::cell::{CellId, CellRef, ReactiveCell};
use super::context::ReactiveContext;
use super::subscriber::{Callback, Event, Payload, SubscriberList, Subscription};
use crate::array::ArrayRef;
use crate::deep::prepare_reactive_value;
use crate::diff;
use crate::error::{Error, Result};
use crate::value::Value;

/// A reactive cell holding an array.
///
/// Cloning creates a new handle to the **same** cell.
#[derive(Clone)]
pub struct ArraySignal {
    inner: Arc<ArraySignalInner>,
}

struct ArraySignalInner {
    id: CellId,
    name: Arc<str>,
    /// Convert inserted elements with deep conversion.
    deep: bool,
    backing: RwLock<ArrayRef>,
    subscribers: SubscriberList,
    /// Nesting depth of will-mutate / has-mutated brackets.
    depth: AtomicUsize,
    /// Elements at the start of the outermost bracket.
    snapshot: Mutex<Option<Vec<Value>>>,
}

/// Non-owning link from a patched array back to its signal.
#[derive(Clone)]
pub struct WeakArraySignal(Weak<ArraySignalInner>);

impl WeakArraySignal {
    pub fn upgrade(&self) -> Option<ArraySignal> {
        self.0.upgrade().map(|inner| ArraySignal { inner })
    }
}

impl ArraySignal {
    /// Create an observable array over a fresh empty array.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::build(name.into(), false, ArrayRef::new())
    }

    /// Create an observable array over `array`.
    ///
    /// `array` is copied first if another signal already owns it. In deep
    /// mode its elements are converted before attaching.
    pub fn with_array(name: impl Into<Arc<str>>, array: ArrayRef, deep: bool) -> Result<Self> {
        let name = name.into();
        let array = claim(array, &name);
        if deep {
            for item in array.to_vec() {
                prepare_reactive_value(item, &name)?;
            }
        }
        Ok(Self::build(name, deep, array))
    }

    fn build(name: Arc<str>, deep: bool, array: ArrayRef) -> Self {
        let signal = Self {
            inner: Arc::new(ArraySignalInner {
                id: CellId::new(),
                name,
                deep,
                backing: RwLock::new(array.clone()),
                subscribers: SubscriberList::default(),
                depth: AtomicUsize::new(0),
                snapshot: Mutex::new(None),
            }),
        };
        array.patch(signal.downgrade());
        debug!(key = %signal.inner.name, cell = %signal.inner.id, "array patched");
        signal
    }

    pub fn downgrade(&self) -> WeakArraySignal {
        WeakArraySignal(Arc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &ArraySignal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_deep(&self) -> bool {
        self.inner.deep
    }

    /// The backing array currently owned by this cell.
    pub fn array(&self) -> ArrayRef {
        self.inner.backing.read().clone()
    }

    pub fn len(&self) -> usize {
        self.array().len()
    }

    pub fn is_empty(&self) -> bool {
        self.array().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.array().get(index)
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.array().to_vec()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Open a mutation bracket. The outermost one snapshots the elements and
    /// emits `BeforeChange`.
    pub fn value_will_mutate(&self) {
        if self.inner.depth.fetch_add(1, AtomicOrdering::SeqCst) > 0 {
            return;
        }
        let array = self.array();
        *self.inner.snapshot.lock() = Some(array.to_vec());
        self.inner
            .subscribers
            .emit(Event::BeforeChange, &Payload::Value(&Value::Array(array)));
    }

    /// Close a mutation bracket. The outermost one emits the change records
    /// and `Change`. Without an open bracket it only emits `Change`.
    pub fn value_has_mutated(&self) {
        let prev = self
            .inner
            .depth
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |d| d.checked_sub(1));
        if matches!(prev, Ok(d) if d > 1) {
            return;
        }

        let array = self.array();
        let before = self.inner.snapshot.lock().take();
        if let Some(before) = before {
            if self.inner.subscribers.has(Event::ArrayChange) {
                let changes = diff::compare(&before, &array.to_vec());
                if !changes.is_empty() {
                    trace!(cell = %self.inner.id, records = changes.len(), "array changed");
                    self.inner
                        .subscribers
                        .emit(Event::ArrayChange, &Payload::Changes(&changes));
                }
            }
        }
        self.inner
            .subscribers
            .emit(Event::Change, &Payload::Value(&Value::Array(array)));
    }

    /// Run `op` natively on the backing array inside one mutation bracket.
    fn run<R>(&self, op: impl FnOnce(&ArrayRef) -> R) -> R {
        self.value_will_mutate();
        let array = self.array();
        let result = {
            let _native = array.native();
            op(&array)
        };
        self.value_has_mutated();
        result
    }

    fn prepare(&self, value: Value) -> Result<Value> {
        if self.inner.deep {
            prepare_reactive_value(value, &self.inner.name)
        } else {
            Ok(value)
        }
    }

    pub fn push(&self, value: Value) -> Result<usize> {
        let value = self.prepare(value)?;
        self.run(|a| a.push(value))
    }

    pub fn pop(&self) -> Option<Value> {
        self.run(|a| a.pop())
    }

    pub fn shift(&self) -> Option<Value> {
        self.run(|a| a.shift())
    }

    pub fn unshift(&self, value: Value) -> Result<usize> {
        let value = self.prepare(value)?;
        self.run(|a| a.unshift(value))
    }

    pub fn splice(
        &self,
        start: Option<i64>,
        delete_count: Option<i64>,
        items: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let items = items
            .into_iter()
            .map(|item| self.prepare(item))
            .collect::<Result<Vec<_>>>()?;
        self.run(|a| a.splice(start, delete_count, items))
    }

    pub fn reverse(&self) {
        self.run(|a| a.reverse())
    }

    pub fn sort(&self) {
        self.sort_by(Value::default_order)
    }

    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        self.run(|a| a.sort_by(compare))
    }

    /// Replace the element at `index`, returning the old one.
    ///
    /// Implemented as a one-element splice, so subscribers see one deletion
    /// and one addition.
    pub fn set(&self, index: usize, value: Value) -> Result<Value> {
        let removed = self.splice(Some(index as i64), Some(1), vec![value])?;
        Ok(removed.into_iter().next().unwrap_or_default())
    }

    /// Let `f` write the raw elements; all writes form one notification.
    ///
    /// In deep mode the elements are converted after `f` returns.
    pub fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Value>),
    {
        self.run(|a| a.mutate(f))?;
        if self.inner.deep {
            for item in self.to_vec() {
                prepare_reactive_value(item, &self.inner.name)?;
            }
        }
        Ok(())
    }

    pub fn remove(&self, value: &Value) -> Vec<Value> {
        self.run(|a| a.remove(value))
    }

    pub fn remove_all(&self) -> Vec<Value> {
        self.run(|a| a.remove_all())
    }

    /// Make `array` the backing array, detaching the previous one.
    fn assign(&self, array: ArrayRef) -> Result<()> {
        if array.ptr_eq(&self.array()) {
            return Ok(());
        }
        let array = claim(array, &self.inner.name);
        if self.inner.deep {
            for item in array.to_vec() {
                prepare_reactive_value(item, &self.inner.name)?;
            }
        }

        self.value_will_mutate();
        let previous = std::mem::replace(&mut *self.inner.backing.write(), array.clone());
        previous.strip();
        array.patch(self.downgrade());
        debug!(key = %self.inner.name, cell = %self.inner.id, "array replaced, previous one detached");
        self.value_has_mutated();
        Ok(())
    }
}

/// Copy `array` if another signal already owns it.
fn claim(array: ArrayRef, name: &str) -> ArrayRef {
    if array.is_patched() {
        debug!(key = %name, "array already reactive elsewhere, cloning before attach");
        array.duplicate()
    } else {
        array
    }
}

impl ReactiveCell for ArraySignal {
    fn id(&self) -> CellId {
        self.inner.id
    }

    fn read(&self) -> Value {
        ReactiveContext::track(self.inner.id, || Arc::new(self.clone()) as CellRef);
        self.peek()
    }

    fn peek(&self) -> Value {
        Value::Array(self.array())
    }

    fn write(&self, value: Value) -> Result<()> {
        match value {
            Value::Array(array) => self.assign(array),
            _ => Err(Error::NotAnArray {
                key: self.inner.name.to_string(),
            }),
        }
    }

    fn subscribe(&self, event: Event, callback: Callback) -> Result<Subscription> {
        let id = self.inner.subscribers.add(event, callback);
        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription::new(id, move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers.remove(id);
            }
        }))
    }

    fn notify(&self) {
        let current = self.peek();
        self.inner
            .subscribers
            .emit(Event::Change, &Payload::Value(&current));
    }

    fn as_array(&self) -> Option<ArraySignal> {
        Some(self.clone())
    }

    fn name(&self) -> String {
        self.inner.name.to_string()
    }
}

impl Drop for ArraySignalInner {
    fn drop(&mut self) {
        self.backing.get_mut().strip();
    }
}

impl Debug for ArraySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArraySignal")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("items", &self.to_vec())
            .finish()
    }
}
