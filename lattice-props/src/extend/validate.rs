//! Validation extender.

use std::sync::Arc;

use super::Extender;
use crate::error::{Error, Result};
use crate::reactive::{ArraySignal, CellId, CellRef, Callback, Event, ReactiveCell, Subscription};
use crate::value::Value;

type Check = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Rejects writes that fail a predicate with [`Error::Validation`].
///
/// The rejected value never reaches the cell, so subscribers see nothing.
pub struct Validate {
    message: String,
    check: Check,
}

impl Validate {
    pub fn new<F>(message: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            check: Arc::new(check),
        }
    }
}

impl Extender for Validate {
    fn name(&self) -> &str {
        "validate"
    }

    fn extend(&self, key: &str, cell: CellRef) -> Result<CellRef> {
        Ok(Arc::new(Validated {
            key: key.into(),
            message: self.message.clone(),
            check: self.check.clone(),
            inner: cell,
        }))
    }
}

struct Validated {
    key: Arc<str>,
    message: String,
    check: Check,
    inner: CellRef,
}

impl ReactiveCell for Validated {
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
        if !(self.check)(&value) {
            return Err(Error::Validation {
                key: self.key.to_string(),
                message: self.message.clone(),
            });
        }
        self.inner.write(value)
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
