//! Signal Implementation
//!
//! A Signal is the scalar reactive cell. It holds one [`Value`] and notifies
//! its subscribers when that value is replaced.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (a memo), the signal
//!    registers itself as a dependency of that context.
//!
//! 2. When a signal's value changes, `BeforeChange` subscribers see the old
//!    value, then the value is stored, then `Change` subscribers see the new
//!    one.
//!
//! 3. Writing a primitive equal to the current one is a no-op. Reference
//!    values always notify, since their contents may have changed in place.

use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::trace;

use super::cell::{CellId, CellRef, ReactiveCell};
use super::context::ReactiveContext;
use super::subscriber::{Callback, Event, Payload, SubscriberList, Subscription};
use crate::error::{Error, Result};
use crate::value::Value;

/// A reactive scalar cell.
///
/// Cloning a `Signal` creates a new handle to the **same** state.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(Value::from(0));
/// count.write(Value::from(5))?;
/// assert_eq!(count.read(), Value::from(5));
/// ```
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    id: CellId,
    name: Option<Arc<str>>,
    value: RwLock<Value>,
    subscribers: SubscriberList,
}

impl Signal {
    /// Create a new signal with the given initial value.
    pub fn new(value: Value) -> Self {
        Self::build(None, value)
    }

    /// Create a signal that reports `name` in error messages.
    pub fn named(name: impl Into<Arc<str>>, value: Value) -> Self {
        Self::build(Some(name.into()), value)
    }

    fn build(name: Option<Arc<str>>, value: Value) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: CellId::new(),
                name,
                value: RwLock::new(value),
                subscribers: SubscriberList::default(),
            }),
        }
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Value) -> Value,
    {
        let next = f(&self.peek());
        self.write(next)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}

impl ReactiveCell for Signal {
    fn id(&self) -> CellId {
        self.inner.id
    }

    fn read(&self) -> Value {
        ReactiveContext::track(self.inner.id, || Arc::new(self.clone()) as CellRef);
        self.peek()
    }

    fn peek(&self) -> Value {
        self.inner.value.read().clone()
    }

    fn write(&self, value: Value) -> Result<()> {
        let old = self.peek();
        if old.same_primitive(&value) {
            return Ok(());
        }

        self.inner
            .subscribers
            .emit(Event::BeforeChange, &Payload::Value(&old));
        *self.inner.value.write() = value.clone();

        trace!(cell = %self.inner.id, "signal changed");
        self.inner
            .subscribers
            .emit(Event::Change, &Payload::Value(&value));
        Ok(())
    }

    fn subscribe(&self, event: Event, callback: Callback) -> Result<Subscription> {
        if event == Event::ArrayChange {
            return Err(Error::invalid_target(self.name(), "subscribe to arrayChange"));
        }
        let id = self.inner.subscribers.add(event, callback);
        let weak: Weak<SignalInner> = Arc::downgrade(&self.inner);
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

impl Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counter() -> (Arc<AtomicI32>, Callback) {
        let count = Arc::new(AtomicI32::new(0));
        let c = count.clone();
        (
            count,
            Arc::new(move |_: &Payload<'_>| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(Value::from(0));
        assert_eq!(signal.read(), Value::from(0));

        signal.write(Value::from(42)).unwrap();
        assert_eq!(signal.read(), Value::from(42));
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(Value::from(10));
        signal
            .update(|v| Value::from(v.as_f64().unwrap_or_default() + 5.0))
            .unwrap();
        assert_eq!(signal.peek(), Value::from(15));
    }

    #[test]
    fn signal_notifies_subscribers() {
        let signal = Signal::new(Value::from(0));
        let (count, callback) = counter();
        signal.subscribe(Event::Change, callback).unwrap();

        signal.write(Value::from(1)).unwrap();
        signal.write(Value::from(2)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn equal_primitive_write_is_silent() {
        let signal = Signal::new(Value::from("a"));
        let (count, callback) = counter();
        signal.subscribe(Event::Change, callback).unwrap();

        signal.write(Value::from("a")).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let list = Value::from(Vec::<Value>::new());
        signal.write(list.clone()).unwrap();
        signal.write(list).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn before_change_sees_old_value() {
        let signal = Signal::new(Value::from(1));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        signal
            .subscribe(
                Event::BeforeChange,
                Arc::new(move |p: &Payload<'_>| s.lock().push(p.value().cloned())),
            )
            .unwrap();

        signal.write(Value::from(2)).unwrap();
        assert_eq!(*seen.lock(), vec![Some(Value::from(1))]);
    }

    #[test]
    fn signal_unsubscribe() {
        let signal = Signal::new(Value::from(0));
        let (count, callback) = counter();
        let sub = signal.subscribe(Event::Change, callback).unwrap();

        signal.write(Value::from(1)).unwrap();
        sub.dispose();
        signal.write(Value::from(2)).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn array_change_is_rejected() {
        let signal = Signal::named("title", Value::Null);
        let (_, callback) = counter();
        let err = signal.subscribe(Event::ArrayChange, callback).unwrap_err();
        assert!(matches!(err, Error::InvalidMutationTarget { ref target, .. } if target == "title"));
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(Value::from(0));
        let signal2 = signal1.clone();

        signal1.write(Value::from(42)).unwrap();
        assert_eq!(signal2.peek(), Value::from(42));
        assert_eq!(signal1.id(), signal2.id());
    }
}
