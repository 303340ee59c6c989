//! Subscriber types for the reactive system.
//!
//! A subscriber is a callback registered on a cell for one notification
//! channel ([`Event`]). Registering returns a [`Subscription`], the only
//! handle through which the callback can later be removed.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::diff::ChangeRecord;
use crate::value::Value;

/// Unique identifier for a subscriber.
///
/// Each registered callback gets a unique ID so that it can be removed from
/// its cell without comparing closures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Notification channel of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Event {
    /// The value was replaced or mutated. Payload: the new value.
    #[default]
    Change,
    /// The value is about to change. Payload: the old value.
    BeforeChange,
    /// An observable array was mutated. Payload: the change records.
    ArrayChange,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Change => "change",
            Event::BeforeChange => "beforeChange",
            Event::ArrayChange => "arrayChange",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Event {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "change" => Ok(Event::Change),
            "beforeChange" => Ok(Event::BeforeChange),
            "arrayChange" => Ok(Event::ArrayChange),
            other => Err(format!("unknown event `{other}`")),
        }
    }
}

/// What a callback receives.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Value(&'a Value),
    Changes(&'a [ChangeRecord]),
}

impl<'a> Payload<'a> {
    pub fn value(&self) -> Option<&'a Value> {
        match self {
            Payload::Value(v) => Some(v),
            Payload::Changes(_) => None,
        }
    }

    pub fn changes(&self) -> Option<&'a [ChangeRecord]> {
        match self {
            Payload::Changes(c) => Some(c),
            Payload::Value(_) => None,
        }
    }
}

/// A notification callback.
pub type Callback = Arc<dyn Fn(&Payload<'_>) + Send + Sync>;

struct Entry {
    id: SubscriberId,
    event: Event,
    callback: Callback,
    active: AtomicBool,
}

/// Ordered list of callbacks owned by one cell.
///
/// Callbacks are invoked outside the lock, on a snapshot of the list, so a
/// callback may freely subscribe or dispose. An entry removed while a
/// notification is in flight is skipped for the rest of that notification.
#[derive(Default)]
pub(crate) struct SubscriberList {
    entries: Mutex<Vec<Arc<Entry>>>,
}

impl SubscriberList {
    pub(crate) fn add(&self, event: Event, callback: Callback) -> SubscriberId {
        let id = SubscriberId::new();
        self.entries.lock().push(Arc::new(Entry {
            id,
            event,
            callback,
            active: AtomicBool::new(true),
        }));
        id
    }

    pub(crate) fn remove(&self, id: SubscriberId) {
        self.entries.lock().retain(|entry| {
            if entry.id == id {
                entry.active.store(false, Ordering::SeqCst);
                false
            } else {
                true
            }
        });
    }

    pub(crate) fn has(&self, event: Event) -> bool {
        self.entries.lock().iter().any(|e| e.event == event)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn emit(&self, event: Event, payload: &Payload<'_>) {
        let snapshot: Vec<Arc<Entry>> = self
            .entries
            .lock()
            .iter()
            .filter(|e| e.event == event)
            .cloned()
            .collect();

        for entry in snapshot {
            if entry.active.load(Ordering::SeqCst) {
                (entry.callback)(payload);
            }
        }
    }
}

/// Disposable handle to a registered callback.
///
/// Clones share the same registration. Dropping a handle does not
/// unsubscribe; call [`Subscription::dispose`].
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

struct SubscriptionInner {
    id: SubscriberId,
    disposed: AtomicBool,
    on_dispose: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub(crate) fn new<F>(id: SubscriberId, on_dispose: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            inner: Arc::new(SubscriptionInner {
                id,
                disposed: AtomicBool::new(false),
                on_dispose: Mutex::new(Some(Box::new(on_dispose))),
            }),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Remove the callback. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let on_dispose = self.inner.on_dispose.lock().take();
        if let Some(f) = on_dispose {
            f();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
