//! Memo Implementation
//!
//! A Memo is a cached derived value. It backs computed fields and
//! subscriptions to accessor functions.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation inside a
//!    [`ReactiveContext`], caches the result and subscribes to every cell the
//!    computation read.
//!
//! 2. When accessed again and no dependency has changed, it returns the cached
//!    value.
//!
//! 3. When a dependency changes and nobody is subscribed to the memo, it is
//!    only marked dirty and recomputes on next access.
//!
//! 4. When a dependency changes and the memo has subscribers, it recomputes
//!    immediately and notifies them if the result changed. Delivery is
//!    synchronous: the originating write returns after all of it.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{trace, warn};

use super::cell::{CellId, CellRef, ReactiveCell};
use super::context::ReactiveContext;
use super::subscriber::{Callback, Event, Payload, SubscriberId, SubscriberList, Subscription};
use crate::error::{Error, Result};
use crate::value::Value;

/// The computation behind a memo.
pub type ComputeFn = Arc<dyn Fn() -> Result<Value> + Send + Sync>;

/// The optional write handler of a memo.
pub type WriteFn = Arc<dyn Fn(Value) -> Result<()> + Send + Sync>;

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// The memo needs to recompute before its value can be read.
    Dirty,
}

/// A cached derived value that recomputes only when dependencies change.
///
/// Cloning creates a new handle to the **same** memo.
#[derive(Clone)]
pub struct Memo {
    inner: Arc<MemoInner>,
}

struct MemoInner {
    id: CellId,

    /// The subscriber ID used for dependency tracking.
    subscriber_id: SubscriberId,

    name: Option<Arc<str>>,
    compute: ComputeFn,
    write: Option<WriteFn>,

    /// The cached result (None if never computed).
    value: RwLock<Option<Result<Value>>>,
    state: RwLock<MemoState>,

    /// Set while the computation runs, so a self-read does not recurse.
    computing: AtomicBool,

    /// Subscriptions on the cells read by the last computation.
    dependencies: Mutex<Vec<Subscription>>,

    subscribers: SubscriberList,
}

impl Memo {
    /// Create a read-only memo. The computation runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        Self::build(None, Arc::new(compute), None)
    }

    /// Create a memo whose writes are handed to `write`.
    pub fn with_setter<F, W>(compute: F, write: W) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
        W: Fn(Value) -> Result<()> + Send + Sync + 'static,
    {
        Self::build(None, Arc::new(compute), Some(Arc::new(write)))
    }

    pub(crate) fn build(name: Option<Arc<str>>, compute: ComputeFn, write: Option<WriteFn>) -> Self {
        Self {
            inner: Arc::new(MemoInner {
                id: CellId::new(),
                subscriber_id: SubscriberId::new(),
                name,
                compute,
                write,
                value: RwLock::new(None),
                state: RwLock::new(MemoState::Dirty),
                computing: AtomicBool::new(false),
                dependencies: Mutex::new(Vec::new()),
                subscribers: SubscriberList::default(),
            }),
        }
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Registers the memo with the running computation, like any cell read.
    pub fn try_get(&self) -> Result<Value> {
        ReactiveContext::track(self.inner.id, || Arc::new(self.clone()) as CellRef);
        self.current()
    }

    fn current(&self) -> Result<Value> {
        if self.state() == MemoState::Dirty {
            return self.recompute();
        }
        match self.inner.value.read().as_ref() {
            Some(result) => result.clone(),
            None => Ok(Value::Undefined),
        }
    }

    /// Mark the memo as needing recomputation.
    pub fn mark_dirty(&self) {
        *self.inner.state.write() = MemoState::Dirty;
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        *self.inner.state.read()
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Number of cells the last computation read.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Run the computation within a reactive context and resubscribe to
    /// whatever it read.
    fn recompute(&self) -> Result<Value> {
        if self.inner.computing.swap(true, Ordering::SeqCst) {
            return match self.inner.value.read().as_ref() {
                Some(result) => result.clone(),
                None => Ok(Value::Undefined),
            };
        }

        let (result, dependencies) = {
            let _ctx = ReactiveContext::enter(self.inner.subscriber_id);
            let result = (self.inner.compute)();
            (result, ReactiveContext::dependencies())
        };
        self.inner.computing.store(false, Ordering::SeqCst);

        self.track_dependencies(dependencies);
        *self.inner.value.write() = Some(result.clone());
        // A failed computation may not have read everything it depends on.
        *self.inner.state.write() = if result.is_ok() {
            MemoState::Clean
        } else {
            MemoState::Dirty
        };
        result
    }

    fn track_dependencies(&self, dependencies: Vec<CellRef>) {
        let stale = std::mem::take(&mut *self.inner.dependencies.lock());
        for subscription in stale {
            subscription.dispose();
        }

        let mut subscriptions = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            if dependency.id() == self.inner.id {
                continue;
            }
            let weak: Weak<MemoInner> = Arc::downgrade(&self.inner);
            let callback: Callback = Arc::new(move |_: &Payload<'_>| {
                if let Some(inner) = weak.upgrade() {
                    Memo { inner }.dependency_changed();
                }
            });
            match dependency.subscribe(Event::Change, callback) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(err) => warn!(cell = %self.inner.id, error = %err, "memo could not track dependency"),
            }
        }
        *self.inner.dependencies.lock() = subscriptions;
    }

    fn dependency_changed(&self) {
        if self.inner.computing.load(Ordering::SeqCst) {
            return;
        }
        if self.inner.subscribers.len() == 0 {
            self.mark_dirty();
            return;
        }

        let old = self.inner.value.read().clone();
        let new = match self.recompute() {
            Ok(new) => new,
            Err(err) => {
                // Stays dirty; the next successful recompute notifies.
                warn!(cell = %self.inner.id, error = %err, "memo recompute failed");
                return;
            }
        };
        if matches!(&old, Some(Ok(previous)) if previous.same_primitive(&new)) {
            return;
        }

        trace!(cell = %self.inner.id, "memo changed");
        let old = old.and_then(|r| r.ok()).unwrap_or_default();
        self.inner
            .subscribers
            .emit(Event::BeforeChange, &Payload::Value(&old));
        self.inner
            .subscribers
            .emit(Event::Change, &Payload::Value(&new));
    }
}

impl ReactiveCell for Memo {
    fn id(&self) -> CellId {
        self.inner.id
    }

    fn read(&self) -> Value {
        self.try_get().unwrap_or_else(|err| {
            warn!(cell = %self.inner.id, error = %err, "computed value failed");
            Value::Undefined
        })
    }

    fn try_read(&self) -> Result<Value> {
        self.try_get()
    }

    fn peek(&self) -> Value {
        self.current().unwrap_or_default()
    }

    fn write(&self, value: Value) -> Result<()> {
        match &self.inner.write {
            Some(write) => write(value),
            None => Err(Error::GetterOnlyWrite { key: self.name() }),
        }
    }

    fn subscribe(&self, event: Event, callback: Callback) -> Result<Subscription> {
        if event == Event::ArrayChange {
            return Err(Error::invalid_target(self.name(), "subscribe to arrayChange"));
        }
        if self.state() == MemoState::Dirty {
            // Establish dependencies so that changes reach the subscriber.
            self.recompute()?;
        }
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

    fn name(&self) -> String {
        match &self.inner.name {
            Some(name) => name.to_string(),
            None => self.inner.id.to_string(),
        }
    }
}

impl Drop for MemoInner {
    fn drop(&mut self) {
        for subscription in self.dependencies.get_mut().drain(..) {
            subscription.dispose();
        }
    }
}

impl Debug for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::sync::atomic::AtomicI32;

    fn doubled(signal: &Signal, calls: &Arc<AtomicI32>) -> Memo {
        let (signal, calls) = (signal.clone(), calls.clone());
        Memo::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Value::from(signal.read().as_f64().unwrap_or_default() * 2.0))
        })
    }

    #[test]
    fn memo_computes_on_first_access() {
        let calls = Arc::new(AtomicI32::new(0));
        let memo = doubled(&Signal::new(Value::from(21)), &calls);

        assert!(!memo.has_value());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(memo.try_get().unwrap(), Value::from(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(memo.has_value());
    }

    #[test]
    fn memo_caches_value_when_clean() {
        let calls = Arc::new(AtomicI32::new(0));
        let memo = doubled(&Signal::new(Value::from(1)), &calls);

        memo.try_get().unwrap();
        memo.try_get().unwrap();
        memo.try_get().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(memo.state(), MemoState::Clean);
    }

    #[test]
    fn dependency_change_marks_dirty() {
        let calls = Arc::new(AtomicI32::new(0));
        let signal = Signal::new(Value::from(1));
        let memo = doubled(&signal, &calls);

        assert_eq!(memo.try_get().unwrap(), Value::from(2));
        assert_eq!(memo.dependency_count(), 1);

        signal.write(Value::from(5)).unwrap();
        assert_eq!(memo.state(), MemoState::Dirty);
        assert_eq!(memo.try_get().unwrap(), Value::from(10));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn subscribed_memo_notifies_only_on_change() {
        let signal = Signal::new(Value::from(1));
        let parity = {
            let signal = signal.clone();
            Memo::new(move || Ok(Value::from(signal.read().as_f64().unwrap_or_default() % 2.0)))
        };

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        parity
            .subscribe(
                Event::Change,
                Arc::new(move |p: &Payload<'_>| s.lock().push(p.value().cloned())),
            )
            .unwrap();

        signal.write(Value::from(3)).unwrap();
        signal.write(Value::from(4)).unwrap();
        assert_eq!(*seen.lock(), vec![Some(Value::from(0))]);
    }

    #[test]
    fn getter_only_memo_rejects_writes() {
        let memo = Memo::build(Some("total".into()), Arc::new(|| Ok(Value::Null)), None);
        assert_eq!(
            memo.write(Value::from(1)).unwrap_err(),
            Error::GetterOnlyWrite { key: "total".into() }
        );
    }

    #[test]
    fn writable_memo_forwards_writes() {
        let signal = Signal::new(Value::from(1));
        let memo = {
            let (read, write) = (signal.clone(), signal.clone());
            Memo::with_setter(move || Ok(read.read()), move |v| write.write(v))
        };
        memo.write(Value::from(7)).unwrap();
        assert_eq!(memo.try_get().unwrap(), Value::from(7));
    }

    #[test]
    fn failed_computation_is_retried() {
        let calls = Arc::new(AtomicI32::new(0));
        let c = calls.clone();
        let memo = Memo::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
            Err(Error::UninitializedAccess { key: "x".into() })
        });
        assert!(memo.try_get().is_err());
        assert_eq!(memo.read(), Value::Undefined);
        assert_eq!(memo.state(), MemoState::Dirty);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn subscribe_surfaces_failed_first_computation() {
        let memo = Memo::new(|| Err(Error::UninitializedAccess { key: "x".into() }));
        let err = memo
            .subscribe(Event::Change, Arc::new(|_: &Payload<'_>| {}))
            .unwrap_err();
        assert_eq!(err, Error::UninitializedAccess { key: "x".into() });
        assert_eq!(memo.subscriber_count(), 0);
    }

    #[test]
    fn failed_recompute_does_not_notify() {
        let signal = Signal::new(Value::from(1));
        let memo = {
            let signal = signal.clone();
            Memo::new(move || match signal.read() {
                Value::Null => Err(Error::UninitializedAccess { key: "x".into() }),
                value => Ok(value),
            })
        };

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        memo.subscribe(
            Event::Change,
            Arc::new(move |p: &Payload<'_>| s.lock().push(p.value().cloned())),
        )
        .unwrap();

        signal.write(Value::Null).unwrap();
        assert!(seen.lock().is_empty());
        assert_eq!(memo.state(), MemoState::Dirty);

        signal.write(Value::from(2)).unwrap();
        assert_eq!(*seen.lock(), vec![Some(Value::from(2))]);
    }

    #[test]
    fn memo_clone_shares_state() {
        let memo1 = Memo::new(|| Ok(Value::from(42)));
        memo1.try_get().unwrap();

        let memo2 = memo1.clone();
        assert_eq!(memo1.id(), memo2.id());
        assert!(memo2.has_value());

        memo1.mark_dirty();
        assert_eq!(memo2.state(), MemoState::Dirty);
    }
}
