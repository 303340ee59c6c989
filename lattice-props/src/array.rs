//! Raw Arrays and Patching
//!
//! [`ArrayRef`] is the native sequence of the value model. While an array is
//! the live value of a reactive field it is *patched*: it carries a weak link
//! to the [`ArraySignal`] that owns it, and every mutator on the array
//! forwards to that signal so the change is recorded and notified. When the
//! field is reassigned, the displaced array is *stripped* and its mutators
//! become plain operations again.
//!
//! # Re-entrancy
//!
//! The signal implements its operations by calling the very same mutators on
//! its backing array. While it does so it holds a [`NativeGuard`], and any
//! mutator called under the guard runs natively instead of forwarding. Without
//! the guard the forwarded call would re-enter the signal and record every
//! change twice.
//!
//! State per array: `unpatched -> patched` on attach, `patched -> unpatched`
//! on detach.

use std::cmp::Ordering;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::ser::{Error as _, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::Result;
use crate::reactive::{ArraySignal, WeakArraySignal};
use crate::value::{Value, VisitGuard};

/// Shared handle to a native array.
///
/// Cloning shares the same array.
#[derive(Clone)]
pub struct ArrayRef {
    inner: Arc<ArrayInner>,
}

struct ArrayInner {
    id: u64,
    items: RwLock<Vec<Value>>,
    owner: RwLock<Option<WeakArraySignal>>,
    native_depth: AtomicUsize,
}

/// While alive, mutators on the array run natively.
pub(crate) struct NativeGuard<'a> {
    array: &'a ArrayRef,
}

impl Drop for NativeGuard<'_> {
    fn drop(&mut self) {
        self.array.inner.native_depth.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

/// Resolve `splice` arguments against an array of length `len`.
///
/// Returns `(start, delete_count)` with `start <= len` and
/// `start + delete_count <= len`:
///
/// - omitted start is 0, negative start counts from the end;
/// - omitted delete count removes everything after `start`, except when the
///   start is omitted too, in which case nothing is removed;
/// - negative delete counts remove nothing.
pub fn clamp_splice(len: usize, start: Option<i64>, delete_count: Option<i64>) -> (usize, usize) {
    let len_i = len as i64;
    let start_idx = match start {
        None => 0,
        Some(s) if s < 0 => (len_i + s).max(0),
        Some(s) => s.min(len_i),
    } as usize;

    let available = len - start_idx;
    let delete = match (start, delete_count) {
        (None, None) => 0,
        (_, None) => available,
        (_, Some(d)) => d.clamp(0, available as i64) as usize,
    };
    (start_idx, delete)
}

impl ArrayRef {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            inner: Arc::new(ArrayInner {
                id: COUNTER.fetch_add(1, AtomicOrdering::Relaxed),
                items: RwLock::new(items),
                owner: RwLock::new(None),
                native_depth: AtomicUsize::new(0),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Identity key for cycle detection.
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    pub fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.items.read().get(index).cloned()
    }

    /// Snapshot of the current elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.read().clone()
    }

    /// Whether this array is the live value of a reactive field.
    pub fn is_patched(&self) -> bool {
        self.signal().is_some()
    }

    /// The observable array this array is patched into.
    pub fn signal(&self) -> Option<ArraySignal> {
        self.inner.owner.read().as_ref().and_then(WeakArraySignal::upgrade)
    }

    /// The signal a mutator should forward to, unless running natively.
    fn intercept(&self) -> Option<ArraySignal> {
        if self.inner.native_depth.load(AtomicOrdering::SeqCst) > 0 {
            None
        } else {
            self.signal()
        }
    }

    pub(crate) fn patch(&self, owner: WeakArraySignal) {
        *self.inner.owner.write() = Some(owner);
    }

    pub(crate) fn strip(&self) {
        *self.inner.owner.write() = None;
    }

    pub(crate) fn native(&self) -> NativeGuard<'_> {
        self.inner.native_depth.fetch_add(1, AtomicOrdering::SeqCst);
        NativeGuard { array: self }
    }

    /// Unpatched shallow copy.
    pub(crate) fn duplicate(&self) -> ArrayRef {
        ArrayRef::from_vec(self.to_vec())
    }

    pub fn push(&self, value: Value) -> Result<usize> {
        if let Some(signal) = self.intercept() {
            return signal.push(value);
        }
        let mut items = self.inner.items.write();
        items.push(value);
        Ok(items.len())
    }

    pub fn pop(&self) -> Option<Value> {
        if let Some(signal) = self.intercept() {
            return signal.pop();
        }
        self.inner.items.write().pop()
    }

    pub fn shift(&self) -> Option<Value> {
        if let Some(signal) = self.intercept() {
            return signal.shift();
        }
        let mut items = self.inner.items.write();
        if items.is_empty() {
            None
        } else {
            Some(items.remove(0))
        }
    }

    pub fn unshift(&self, value: Value) -> Result<usize> {
        if let Some(signal) = self.intercept() {
            return signal.unshift(value);
        }
        let mut items = self.inner.items.write();
        items.insert(0, value);
        Ok(items.len())
    }

    /// Remove `delete_count` elements at `start` and insert `items` there,
    /// returning the removed elements. Arguments are resolved by
    /// [`clamp_splice`].
    pub fn splice(
        &self,
        start: Option<i64>,
        delete_count: Option<i64>,
        items: Vec<Value>,
    ) -> Result<Vec<Value>> {
        if let Some(signal) = self.intercept() {
            return signal.splice(start, delete_count, items);
        }
        let mut current = self.inner.items.write();
        let (start, delete) = clamp_splice(current.len(), start, delete_count);
        Ok(current.splice(start..start + delete, items).collect())
    }

    pub fn reverse(&self) {
        if let Some(signal) = self.intercept() {
            return signal.reverse();
        }
        self.inner.items.write().reverse();
    }

    /// Stable sort with the default ordering: undefined last, everything
    /// else by string form.
    pub fn sort(&self) {
        self.sort_by(Value::default_order);
    }

    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        if let Some(signal) = self.intercept() {
            return signal.sort_by(compare);
        }
        // The comparator may read this array, so sort outside the lock.
        let mut sorted = self.to_vec();
        sorted.sort_by(compare);
        *self.inner.items.write() = sorted;
    }

    /// Replace the element at `index` with a one-element splice and return
    /// the old element. Past the end the value is appended and `Undefined`
    /// is returned.
    pub fn set(&self, index: usize, value: Value) -> Result<Value> {
        if let Some(signal) = self.intercept() {
            return signal.set(index, value);
        }
        let removed = self.splice(Some(index as i64), Some(1), vec![value])?;
        Ok(removed.into_iter().next().unwrap_or_default())
    }

    /// Give `f` direct access to the elements. On a patched array the whole
    /// closure is one notification batch.
    ///
    /// `f` must not touch this array through another handle.
    pub fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Value>),
    {
        if let Some(signal) = self.intercept() {
            return signal.mutate(f);
        }
        f(&mut self.inner.items.write());
        Ok(())
    }

    /// Remove every element equal to `value`, returning the removed ones.
    pub fn remove(&self, value: &Value) -> Vec<Value> {
        if let Some(signal) = self.intercept() {
            return signal.remove(value);
        }
        let mut items = self.inner.items.write();
        let mut removed = Vec::new();
        items.retain(|item| {
            if item == value {
                removed.push(item.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn remove_all(&self) -> Vec<Value> {
        if let Some(signal) = self.intercept() {
            return signal.remove_all();
        }
        std::mem::take(&mut *self.inner.items.write())
    }
}

impl Default for ArrayRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(_visit) = VisitGuard::enter(self.addr()) else {
            return f.write_str("[Circular]");
        };
        f.debug_list().entries(self.to_vec()).finish()
    }
}

impl Serialize for ArrayRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let _visit = VisitGuard::enter(self.addr())
            .ok_or_else(|| S::Error::custom("cannot serialize a cyclic structure"))?;

        let items = self.to_vec();
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in &items {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(items: &[i32]) -> Vec<Value> {
        items.iter().map(|&n| Value::from(n)).collect()
    }

    #[test]
    fn clamp_matches_native_splice() {
        assert_eq!(clamp_splice(5, None, None), (0, 0));
        assert_eq!(clamp_splice(5, Some(2), None), (2, 3));
        assert_eq!(clamp_splice(5, Some(-2), None), (3, 2));
        assert_eq!(clamp_splice(5, Some(-10), Some(1)), (0, 1));
        assert_eq!(clamp_splice(5, Some(9), Some(3)), (5, 0));
        assert_eq!(clamp_splice(5, Some(1), Some(-4)), (1, 0));
        assert_eq!(clamp_splice(5, Some(3), Some(10)), (3, 2));
        assert_eq!(clamp_splice(0, Some(0), Some(1)), (0, 0));
    }

    #[test]
    fn unpatched_mutators_are_native() {
        let array = ArrayRef::from_vec(nums(&[3, 1, 2]));
        assert_eq!(array.push(Value::from(4)).unwrap(), 4);
        assert_eq!(array.shift(), Some(Value::from(3)));
        array.sort();
        assert_eq!(array.to_vec(), nums(&[1, 2, 4]));
        assert_eq!(array.set(1, Value::from(9)).unwrap(), Value::from(2));
        assert_eq!(array.set(7, Value::from(5)).unwrap(), Value::Undefined);
        assert_eq!(array.to_vec(), nums(&[1, 9, 4, 5]));
        assert_eq!(array.remove(&Value::from(9)), nums(&[9]));
        array.reverse();
        assert_eq!(array.to_vec(), nums(&[5, 4, 1]));
        assert!(!array.is_patched());
    }

    #[test]
    fn splice_returns_removed_elements() {
        let array = ArrayRef::from_vec(nums(&[1, 2, 3, 4]));
        let removed = array.splice(Some(1), Some(2), nums(&[7, 8, 9])).unwrap();
        assert_eq!(removed, nums(&[2, 3]));
        assert_eq!(array.to_vec(), nums(&[1, 7, 8, 9, 4]));
    }

    #[test]
    fn duplicate_is_a_distinct_array() {
        let array = ArrayRef::from_vec(nums(&[1]));
        let copy = array.duplicate();
        copy.push(Value::from(2)).unwrap();
        assert!(!copy.ptr_eq(&array));
        assert_eq!(array.len(), 1);
    }
}
