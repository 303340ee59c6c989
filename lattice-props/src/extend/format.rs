//! Formatting extender.

use std::sync::Arc;

use super::Extender;
use crate::error::Result;
use crate::reactive::{ArraySignal, CellId, CellRef, Callback, Event, ReactiveCell, Subscription};
use crate::value::Value;

type MapFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Maps every written value before it is stored.
pub struct Format {
    map: MapFn,
}

impl Format {
    pub fn new<F>(map: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self { map: Arc::new(map) }
    }
}

impl Extender for Format {
    fn name(&self) -> &str {
        "format"
    }

    fn extend(&self, _key: &str, cell: CellRef) -> Result<CellRef> {
        Ok(Arc::new(Formatted {
            map: self.map.clone(),
            inner: cell,
        }))
    }
}

struct Formatted {
    map: MapFn,
    inner: CellRef,
}

impl ReactiveCell for Formatted {
    fn id(&self) -> CellId {
        self.inner.id()
    }

    fn read(&self) -> Value {
        self.inner.read()
    }

    fn try_read(&self) -> Result<Value> {
        self.inner.try_read()
    }

    fn peek(&self) -> Value {
        self.inner.peek()
    }

    fn write(&self, value: Value) -> Result<()> {
        self.inner.write((self.map)(value))
    }

    fn subscribe(&self, event: Event, callback: Callback) -> Result<Subscription> {
        self.inner.subscribe(event, callback)
    }

    fn notify(&self) {
        self.inner.notify()
    }

    fn as_array(&self) -> Option<ArraySignal> {
        self.inner.as_array()
    }

    fn name(&self) -> String {
        self.inner.name()
    }
}
