//! Dynamic Values
//!
//! The engine works on an untyped object graph: scalars, arrays, objects and
//! opaque foreign values. This module defines [`Value`], the enum every cell
//! stores, together with its JSON and MessagePack bridges.
//!
//! # Equality
//!
//! Primitives compare by value (`NaN` equals `NaN` so that a cell holding
//! `NaN` does not re-notify forever). Arrays, objects and opaque values
//! compare by identity, never by content.
//!
//! # Serialization
//!
//! Serializing a reactive graph produces the same output as the plain graph
//! it was converted from: current values are read without tracking, keys come
//! out in insertion order, `Undefined` object entries are skipped (and become
//! `null` inside arrays), non-finite numbers become `null`, and cycles are
//! rejected.

use std::any::Any;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt::{self, Debug};
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::array::ArrayRef;
use crate::error::{Error, Result};
use crate::object::ObjectRef;

/// A dynamically typed value held by a reactive cell or an object slot.
#[derive(Clone, Default)]
pub enum Value {
    /// Assigned, but with no value. Distinct from "never assigned".
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(ArrayRef),
    Object(ObjectRef),
    /// A foreign value the engine never reaches into.
    Opaque(Opaque),
}

/// A foreign value stored by identity.
#[derive(Clone)]
pub struct Opaque(Arc<dyn Any + Send + Sync>);

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &Opaque) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Value {
    /// Convert a JSON document into a plain (not yet reactive) value graph.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(ArrayRef::from_vec(items.into_iter().map(Value::from_json).collect()))
            }
            serde_json::Value::Object(map) => Value::Object(ObjectRef::from_entries(
                map.into_iter().map(|(k, v)| (k, Value::from_json(v))),
            )),
        }
    }

    /// Snapshot the current state of the graph as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Snapshot the current state of the graph as MessagePack.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Rebuild a plain value graph from a MessagePack snapshot.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        let json: serde_json::Value =
            rmp_serde::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Value::from_json(json))
    }

    /// Scalars, as opposed to reference values.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Array(_) | Value::Object(_) | Value::Opaque(_))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Whether replacing `self` with `next` may skip notification.
    ///
    /// Only equal primitives are considered unchanged; reference values
    /// always notify because their contents may have changed in place.
    pub(crate) fn same_primitive(&self, next: &Value) -> bool {
        self.is_primitive() && next.is_primitive() && self == next
    }

    /// String form used by the default array ordering.
    pub(crate) fn sort_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(a) => {
                // An array already being joined renders as empty.
                let Some(_visit) = VisitGuard::enter(a.addr()) else {
                    return String::new();
                };
                a.to_vec()
                    .iter()
                    .map(|v| match v {
                        Value::Undefined | Value::Null => String::new(),
                        other => other.sort_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(",")
            }
            Value::Object(_) | Value::Opaque(_) => "[object Object]".to_string(),
        }
    }

    /// Default ordering for `sort()`: undefined last, everything else by
    /// string form.
    pub(crate) fn default_order(a: &Value, b: &Value) -> Ordering {
        match (a.is_undefined(), b.is_undefined()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => a.sort_string().cmp(&b.sort_string()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Opaque(a), Value::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(a) => a.fmt(f),
            Value::Object(o) => o.fmt(f),
            Value::Opaque(_) => f.write_str("<opaque>"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<ArrayRef> for Value {
    fn from(a: ArrayRef) -> Self {
        Value::Array(a)
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(ArrayRef::from_vec(items))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

// ----------------------------------------------------------------------------
// Serialization
// ----------------------------------------------------------------------------

thread_local! {
    static VISITING: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

/// Marks a reference node as "currently being serialized" so that a cycle
/// fails instead of recursing forever.
pub(crate) struct VisitGuard {
    addr: usize,
}

impl VisitGuard {
    pub(crate) fn enter(addr: usize) -> Option<Self> {
        VISITING.with(|set| set.borrow_mut().insert(addr).then(|| Self { addr }))
    }
}

impl Drop for VisitGuard {
    fn drop(&mut self) {
        VISITING.with(|set| {
            set.borrow_mut().remove(&self.addr);
        });
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Undefined | Value::Null | Value::Opaque(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => {
                let n = *n;
                if !n.is_finite() {
                    serializer.serialize_unit()
                } else if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_992.0 {
                    serializer.serialize_i64(n as i64)
                } else {
                    serializer.serialize_f64(n)
                }
            }
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(a) => a.serialize(serializer),
            Value::Object(o) => o.serialize(serializer),
        }
    }
}
