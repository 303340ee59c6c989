//! Rate-limiting extender.
//!
//! Delays `Change` notifications of a field on the tokio timer. Writes are
//! stored immediately; only the notification is deferred, and it carries the
//! value current at delivery time.
//!
//! - [`RateLimitMethod::NotifyAtFixedRate`] (throttle): the first change
//!   starts a timer; changes before it fires are folded into one
//!   notification.
//! - [`RateLimitMethod::NotifyWhenChangesStop`] (debounce): every change
//!   restarts the timer.
//!
//! Without a tokio runtime on the writing thread there is no timer to use,
//! and notifications are delivered synchronously.

use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::Extender;
use crate::error::Result;
use crate::reactive::{
    ArraySignal, CellId, CellRef, Callback, Event, Payload, ReactiveCell, ReactiveContext,
    SubscriberList, Subscription,
};
use crate::value::Value;

/// When a rate-limited field notifies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RateLimitMethod {
    #[default]
    NotifyAtFixedRate,
    NotifyWhenChangesStop,
}

/// Rate-limit configuration. Also usable directly as an extender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    pub timeout_ms: u64,
    pub method: RateLimitMethod,
}

impl RateLimit {
    pub fn throttle(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            method: RateLimitMethod::NotifyAtFixedRate,
        }
    }

    pub fn debounce(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            method: RateLimitMethod::NotifyWhenChangesStop,
        }
    }
}

impl Extender for RateLimit {
    fn name(&self) -> &str {
        "rateLimit"
    }

    fn extend(&self, key: &str, cell: CellRef) -> Result<CellRef> {
        let limited = RateLimited {
            inner: Arc::new(RateLimitedInner {
                id: CellId::new(),
                key: key.into(),
                config: *self,
                cell: cell.clone(),
                subscribers: SubscriberList::default(),
                pending: Mutex::new(None),
                upstream: Mutex::new(None),
            }),
        };

        let weak: Weak<RateLimitedInner> = Arc::downgrade(&limited.inner);
        let upstream = cell.subscribe(
            Event::Change,
            Arc::new(move |_: &Payload<'_>| {
                if let Some(inner) = weak.upgrade() {
                    RateLimited { inner }.schedule();
                }
            }),
        )?;
        *limited.inner.upstream.lock() = Some(upstream);
        Ok(Arc::new(limited))
    }
}

/// Cell wrapper produced by [`RateLimit`].
#[derive(Clone)]
struct RateLimited {
    inner: Arc<RateLimitedInner>,
}

struct RateLimitedInner {
    id: CellId,
    key: Arc<str>,
    config: RateLimit,
    cell: CellRef,
    /// `Change` subscribers, notified on the timer.
    subscribers: SubscriberList,
    pending: Mutex<Option<JoinHandle<()>>>,
    upstream: Mutex<Option<Subscription>>,
}

impl RateLimited {
    fn schedule(&self) {
        let Ok(handle) = Handle::try_current() else {
            debug!(key = %self.inner.key, "no tokio runtime, delivering change synchronously");
            self.deliver();
            return;
        };

        let mut pending = self.inner.pending.lock();
        match self.inner.config.method {
            RateLimitMethod::NotifyAtFixedRate => {
                if pending.as_ref().is_some_and(|task| !task.is_finished()) {
                    return;
                }
            }
            RateLimitMethod::NotifyWhenChangesStop => {
                if let Some(task) = pending.take() {
                    task.abort();
                }
            }
        }

        let weak = Arc::downgrade(&self.inner);
        let delay = Duration::from_millis(self.inner.config.timeout_ms);
        *pending = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                RateLimited { inner }.deliver();
            }
        }));
    }

    fn deliver(&self) {
        let current = self.inner.cell.peek();
        trace!(key = %self.inner.key, cell = %self.inner.id, "rate-limited change delivered");
        self.inner
            .subscribers
            .emit(Event::Change, &Payload::Value(&current));
    }
}

impl ReactiveCell for RateLimited {
    fn id(&self) -> CellId {
        self.inner.id
    }

    fn read(&self) -> Value {
        // Computations depend on this wrapper, not on the cell inside it.
        ReactiveContext::track(self.inner.id, || Arc::new(self.clone()) as CellRef);
        self.inner.cell.peek()
    }

    fn try_read(&self) -> Result<Value> {
        ReactiveContext::track(self.inner.id, || Arc::new(self.clone()) as CellRef);
        ReactiveContext::untracked(|| self.inner.cell.try_read())
    }

    fn peek(&self) -> Value {
        self.inner.cell.peek()
    }

    fn write(&self, value: Value) -> Result<()> {
        self.inner.cell.write(value)
    }

    fn subscribe(&self, event: Event, callback: Callback) -> Result<Subscription> {
        if event != Event::Change {
            return self.inner.cell.subscribe(event, callback);
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
        self.schedule();
    }

    fn as_array(&self) -> Option<ArraySignal> {
        self.inner.cell.as_array()
    }

    fn name(&self) -> String {
        self.inner.key.to_string()
    }
}

impl Drop for RateLimitedInner {
    fn drop(&mut self) {
        if let Some(upstream) = self.upstream.get_mut().take() {
            upstream.dispose();
        }
        if let Some(task) = self.pending.get_mut().take() {
            task.abort();
        }
    }
}

impl Debug for RateLimited {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimited")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{Class, FieldOptions};
    use crate::object::ObjectRef;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counted(model: &ObjectRef, key: &str) -> Arc<AtomicI32> {
        let calls = Arc::new(AtomicI32::new(0));
        let c = calls.clone();
        model
            .cell(key)
            .unwrap()
            .subscribe(
                Event::Change,
                Arc::new(move |_: &Payload<'_>| {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        calls
    }

    fn model(limit: RateLimit) -> ObjectRef {
        let class = Class::new("Search");
        class.observable("query", FieldOptions::default());
        class.add_extender("query", limit);
        let model = class.instantiate();
        model.set("query", Value::from("")).unwrap();
        model
    }

    #[test]
    fn config_loads_from_json() {
        let limit: RateLimit =
            serde_json::from_str(r#"{ "timeout_ms": 50, "method": "notifyWhenChangesStop" }"#)
                .unwrap();
        assert_eq!(limit, RateLimit::debounce(50));
    }

    #[test]
    fn without_runtime_changes_are_synchronous() {
        let model = model(RateLimit::throttle(1_000));
        let calls = counted(&model, "query");

        model.set("query", Value::from("a")).unwrap();
        model.set("query", Value::from("ab")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn throttle_folds_changes() {
        let model = model(RateLimit::throttle(20));
        let calls = counted(&model, "query");

        model.set("query", Value::from("a")).unwrap();
        model.set("query", Value::from("ab")).unwrap();
        model.set("query", Value::from("abc")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(model.get("query").unwrap(), Value::from("abc"));
    }

    #[tokio::test]
    async fn debounce_waits_for_quiet() {
        let model = model(RateLimit::debounce(30));
        let calls = counted(&model, "query");

        for text in ["a", "ab", "abc"] {
            model.set("query", Value::from(text)).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
