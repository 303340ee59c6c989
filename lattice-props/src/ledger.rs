//! Subscription Ledger
//!
//! Each instance keeps the subscriptions created through it in a [`Ledger`],
//! so that a consumer can tear all of them down with one
//! [`Disposable::dispose`] call. The ledger's storage is allocated by the
//! first subscription; an instance nobody subscribes through never pays for
//! it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::reactive::{
    Callback, CellRef, ComputeFn, Event, Memo, Payload, ReactiveCell, ReactiveContext,
    Subscription,
};
use crate::value::Value;

/// Ordered record of the subscriptions created through one instance.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: Mutex<Option<Vec<Subscription>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `subscription`, dropping entries disposed in the meantime.
    pub fn record(&self, subscription: Subscription) {
        let mut entries = self.entries.lock();
        let entries = entries.get_or_insert_with(Vec::new);
        entries.retain(|s| !s.is_disposed());
        entries.push(subscription);
    }

    /// Number of recorded subscriptions that are still active.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .as_ref()
            .map_or(0, |entries| entries.iter().filter(|s| !s.is_disposed()).count())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any subscription was ever recorded since the last disposal.
    pub fn is_allocated(&self) -> bool {
        self.entries.lock().is_some()
    }

    /// Dispose every recorded subscription, in recording order.
    pub fn dispose_all(&self) {
        let Some(entries) = self.entries.lock().take() else {
            return;
        };
        debug!(count = entries.len(), "disposing subscriptions");
        for subscription in entries {
            subscription.dispose();
        }
    }
}

/// What a subscription observes.
#[derive(Clone)]
pub enum Target {
    /// A function of reactive state; notifies when its result changes.
    Accessor(ComputeFn),
    /// A cell, observed directly.
    Cell(CellRef),
}

impl Target {
    pub fn accessor<F>(f: F) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        Self::Accessor(Arc::new(f))
    }
}

impl From<CellRef> for Target {
    fn from(cell: CellRef) -> Self {
        Self::Cell(cell)
    }
}

/// Options of [`subscribe`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscribeOptions {
    /// Dispose after the first notification.
    pub once: bool,
    pub event: Event,
}

impl SubscribeOptions {
    pub fn once() -> Self {
        Self {
            once: true,
            event: Event::Change,
        }
    }

    pub fn event(event: Event) -> Self {
        Self { once: false, event }
    }
}

/// Subscribe `callback` to `target` and record the subscription in `ledger`.
///
/// With `once`, the subscription is disposed before the callback runs, so a
/// notification triggered from inside the callback does not reach it again.
///
/// `ArrayChange` needs an observable array: a cell whose
/// [`as_array`](ReactiveCell::as_array) is `Some`, or an accessor returning a
/// patched array. Anything else fails with [`Error::InvalidMutationTarget`].
pub fn subscribe(
    ledger: &Ledger,
    target: Target,
    callback: Callback,
    options: SubscribeOptions,
) -> Result<Subscription> {
    let slot: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());
    let fired = Arc::new(AtomicBool::new(false));
    let callback = if options.once {
        once(callback, slot.clone(), fired.clone())
    } else {
        callback
    };

    let subscription = match target {
        Target::Cell(cell) if options.event == Event::ArrayChange => match cell.as_array() {
            Some(array) => array.subscribe(Event::ArrayChange, callback)?,
            None => {
                return Err(Error::invalid_target(cell.name(), "subscribe to arrayChange"));
            }
        },
        Target::Cell(cell) => cell.subscribe(options.event, callback)?,
        Target::Accessor(accessor) if options.event == Event::ArrayChange => {
            let value = ReactiveContext::untracked(|| accessor())?;
            let array = value
                .as_array()
                .and_then(|array| array.signal())
                .ok_or_else(|| {
                    Error::invalid_target(
                        format!("accessor returning {}", value.type_name()),
                        "subscribe to arrayChange",
                    )
                })?;
            array.subscribe(Event::ArrayChange, callback)?
        }
        Target::Accessor(accessor) => {
            let memo = Memo::build(None, accessor, None);
            let inner = memo.subscribe(options.event, callback)?;
            // The subscription owns the memo; disposing it releases both.
            Subscription::new(inner.id(), move || {
                inner.dispose();
                drop(memo);
            })
        }
    };

    if options.once {
        let _ = slot.set(subscription.clone());
        if fired.load(Ordering::SeqCst) {
            subscription.dispose();
        }
    }
    ledger.record(subscription.clone());
    Ok(subscription)
}

fn once(callback: Callback, slot: Arc<OnceLock<Subscription>>, fired: Arc<AtomicBool>) -> Callback {
    Arc::new(move |payload: &Payload<'_>| {
        if fired.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(subscription) = slot.get() {
            subscription.dispose();
        }
        callback(payload);
    })
}

/// Gives an owner bulk disposal of its subscriptions.
pub trait Disposable {
    fn ledger(&self) -> &Ledger;

    /// Subscribe through this owner. See [`subscribe`].
    fn subscribe<F>(&self, target: Target, options: SubscribeOptions, callback: F) -> Result<Subscription>
    where
        F: Fn(&Payload<'_>) + Send + Sync + 'static,
    {
        subscribe(self.ledger(), target, Arc::new(callback), options)
    }

    /// Dispose every subscription created through this owner.
    ///
    /// Does nothing, and allocates nothing, if there never was one.
    fn dispose(&self) {
        self.ledger().dispose_all();
    }
}
