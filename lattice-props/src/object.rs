//! Objects
//!
//! [`ObjectRef`] is the object of the value model: an insertion-ordered table
//! of slots behind a shared handle. A slot is either plain data or a reactive
//! property backed by a cell. Class instances start empty and materialize
//! declared fields as they are used.
//!
//! # Slot Dispatch
//!
//! | slot                  | `get`                     | `set`                         |
//! |-----------------------|---------------------------|-------------------------------|
//! | data                  | the value                 | replace (fails when frozen)   |
//! | reactive property     | tracked cell read         | cell write                    |
//! | declared, not yet set | uninitialized error       | materialize with the value    |
//! | declared computed     | materialize, then read    | materialize, then write       |
//! | absent                | `Undefined`               | new data slot                 |

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};
use tracing::trace;

use crate::deep::{self, prepare_reactive_value};
use crate::error::{Error, Result};
use crate::ledger::{Disposable, Ledger};
use crate::materialize::{self, exposed_name};
use crate::meta::{Class, FieldKind};
use crate::reactive::{self, CellRef};
use crate::value::{Value, VisitGuard};

/// Identity of an object. Used as the key of the conversion tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// What an object was created from.
#[derive(Debug, Clone)]
pub enum Prototype {
    /// An ordinary record.
    Object,
    /// A record without prototype.
    Null,
    /// An instance of a class.
    Class(Class),
}

/// A reactive property installed on an object.
#[derive(Clone)]
pub(crate) struct Property {
    pub(crate) cell: CellRef,
    pub(crate) deep: bool,
}

#[derive(Clone)]
enum Slot {
    Data(Value),
    Property(Property),
}

/// Shared handle to an object.
///
/// Cloning shares the same object.
#[derive(Clone)]
pub struct ObjectRef {
    inner: Arc<ObjectInner>,
}

/// Non-owning handle to an object.
#[derive(Clone)]
pub struct WeakObjectRef(Weak<ObjectInner>);

impl WeakObjectRef {
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(|inner| ObjectRef { inner })
    }
}

struct ObjectInner {
    id: ObjectId,
    prototype: Prototype,
    slots: RwLock<IndexMap<String, Slot>>,
    /// Non-enumerable entries exposing backing cells.
    hidden: RwLock<IndexMap<String, CellRef>>,
    frozen: AtomicBool,
    ledger: Ledger,
}

impl ObjectRef {
    /// Create an empty plain record.
    pub fn new() -> Self {
        Self::with_prototype(Prototype::Object)
    }

    /// Create an empty record without prototype.
    pub fn null_prototype() -> Self {
        Self::with_prototype(Prototype::Null)
    }

    pub(crate) fn with_prototype(prototype: Prototype) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                id: ObjectId::new(),
                prototype,
                slots: RwLock::new(IndexMap::new()),
                hidden: RwLock::new(IndexMap::new()),
                frozen: AtomicBool::new(false),
                ledger: Ledger::new(),
            }),
        }
    }

    /// Create a plain record holding `entries` as data slots.
    pub fn from_entries<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let object = Self::new();
        object.inner.slots.write().extend(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), Slot::Data(value))),
        );
        object
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Arc::downgrade(&self.inner))
    }

    pub fn prototype(&self) -> &Prototype {
        &self.inner.prototype
    }

    pub fn class(&self) -> Option<&Class> {
        match &self.inner.prototype {
            Prototype::Class(class) => Some(class),
            _ => None,
        }
    }

    /// Whether deep conversion may convert this object.
    pub fn is_plain_record(&self) -> bool {
        matches!(self.inner.prototype, Prototype::Object | Prototype::Null)
    }

    /// Forbid new slots and data writes. Installed properties stay writable.
    pub fn freeze(&self) {
        self.inner.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::SeqCst)
    }

    fn slot(&self, key: &str) -> Option<Slot> {
        self.inner.slots.read().get(key).cloned()
    }

    /// Read `key`.
    pub fn get(&self, key: &str) -> Result<Value> {
        match self.slot(key) {
            Some(Slot::Data(value)) => return Ok(value),
            Some(Slot::Property(property)) => return property.cell.try_read(),
            None => {}
        }

        let Some(descriptor) = self.class().and_then(|c| c.descriptor(key)) else {
            return Ok(Value::Undefined);
        };
        match descriptor.kind {
            Some(FieldKind::Computed(accessors)) => {
                materialize::materialize_computed(self, key, accessors, descriptor.expose)?
                    .try_read()
            }
            Some(FieldKind::Observable | FieldKind::Array) => {
                Err(Error::UninitializedAccess { key: key.to_string() })
            }
            None => Ok(Value::Undefined),
        }
    }

    /// Write `key`.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        match self.slot(key) {
            Some(Slot::Property(property)) => return write_property(&property, key, value),
            Some(Slot::Data(_)) => return self.set_data(key, value),
            None => {}
        }

        let descriptor = self.class().and_then(|c| c.descriptor(key));
        match descriptor {
            Some(descriptor) => match descriptor.kind {
                Some(FieldKind::Observable) => {
                    materialize::materialize_property(self, key, value, descriptor.options())
                        .map(drop)
                }
                Some(FieldKind::Array) => {
                    materialize::materialize_array(self, key, value, descriptor.options())
                        .map(drop)
                }
                Some(FieldKind::Computed(accessors)) => {
                    materialize::materialize_computed(self, key, accessors, descriptor.expose)?
                        .write(value)
                }
                None => self.set_data(key, value),
            },
            None => self.set_data(key, value),
        }
    }

    fn set_data(&self, key: &str, value: Value) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::FrozenWrite { key: key.to_string() });
        }
        trace!(object = %self.inner.id, key = %key, "data slot written");
        self.inner
            .slots
            .write()
            .insert(key.to_string(), Slot::Data(value));
        Ok(())
    }

    /// Install `property` under `key`, replacing a data slot.
    ///
    /// If another property got there first, that one is kept and returned.
    pub(crate) fn install(&self, key: &str, property: Property, expose: bool) -> Result<CellRef> {
        if self.is_frozen() {
            return Err(Error::FrozenWrite { key: key.to_string() });
        }
        let cell = property.cell.clone();
        {
            let mut slots = self.inner.slots.write();
            if let Some(Slot::Property(existing)) = slots.get(key) {
                return Ok(existing.cell.clone());
            }
            slots.insert(key.to_string(), Slot::Property(property));
        }
        if expose {
            self.inner
                .hidden
                .write()
                .insert(exposed_name(key), cell.clone());
        }
        Ok(cell)
    }

    /// Enumerable own keys, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.slots.read().keys().cloned().collect()
    }

    /// Names of the non-enumerable entries exposing backing cells.
    pub fn hidden_keys(&self) -> Vec<String> {
        self.inner.hidden.read().keys().cloned().collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.slots.read().contains_key(key)
    }

    /// The cell exposed under `name` (see [`exposed_name`]).
    pub fn exposed(&self, name: &str) -> Option<CellRef> {
        self.inner.hidden.read().get(name).cloned()
    }

    /// The backing cell of a materialized reactive field.
    pub fn cell(&self, key: &str) -> Option<CellRef> {
        match self.slot(key) {
            Some(Slot::Property(property)) => Some(property.cell),
            _ => None,
        }
    }

    /// Whether `key` has been materialized as a reactive property.
    pub fn is_materialized(&self, key: &str) -> bool {
        self.cell(key).is_some()
    }

    /// Data slots, for deep conversion.
    pub(crate) fn data_entries(&self) -> Vec<(String, Value)> {
        self.inner
            .slots
            .read()
            .iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Data(value) => Some((key.clone(), value.clone())),
                Slot::Property(_) => None,
            })
            .collect()
    }

    /// Current values of all enumerable keys, read without tracking.
    pub fn entries(&self) -> Vec<(String, Value)> {
        let slots: Vec<(String, Slot)> = self
            .inner
            .slots
            .read()
            .iter()
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect();
        slots
            .into_iter()
            .map(|(key, slot)| match slot {
                Slot::Data(value) => (key, value),
                Slot::Property(property) => (key, property.cell.peek()),
            })
            .collect()
    }

    fn array_cell(&self, key: &str, operation: &str) -> Result<CellRef> {
        if let Some(cell) = self.cell(key) {
            return Ok(cell);
        }
        let declared = self
            .class()
            .and_then(|c| c.descriptor(key))
            .is_some_and(|d| d.is_array());
        if declared {
            Err(Error::UninitializedAccess { key: key.to_string() })
        } else {
            Err(Error::invalid_target(key, operation))
        }
    }

    /// Run `f` over the raw items of the array field `key` as one batch.
    pub fn mutate(&self, key: &str, f: impl FnOnce(&mut Vec<Value>)) -> Result<()> {
        let cell = self.array_cell(key, "mutate")?;
        reactive::mutate(&cell, f)
    }

    /// Replace one element of the array field `key`, returning the old one.
    pub fn set_at(&self, key: &str, index: usize, value: Value) -> Result<Value> {
        let cell = self.array_cell(key, "set")?;
        reactive::set_at(&cell, index, value)
    }
}

fn write_property(property: &Property, key: &str, value: Value) -> Result<()> {
    let value = if property.deep {
        prepare_reactive_value(value, key)?
    } else {
        value
    };
    property.cell.write(value)
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposable for ObjectRef {
    fn ledger(&self) -> &Ledger {
        &self.inner.ledger
    }
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        deep::forget(self.id);
    }
}

impl Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = Arc::as_ptr(&self.inner) as usize;
        let Some(_visit) = VisitGuard::enter(addr) else {
            return f.write_str("[Circular]");
        };
        f.debug_map().entries(self.entries()).finish()
    }
}

impl Serialize for ObjectRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let addr = Arc::as_ptr(&self.inner) as usize;
        let _visit = VisitGuard::enter(addr)
            .ok_or_else(|| S::Error::custom("cannot serialize a cyclic structure"))?;

        let entries: Vec<(String, Value)> = self
            .entries()
            .into_iter()
            .filter(|(_, v)| !matches!(v, Value::Undefined | Value::Opaque(_)))
            .collect();
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in &entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::FieldOptions;

    #[test]
    fn plain_slots_round_trip() {
        let object = ObjectRef::new();
        assert_eq!(object.get("missing").unwrap(), Value::Undefined);

        object.set("a", Value::from(1)).unwrap();
        object.set("b", Value::from("x")).unwrap();
        object.set("a", Value::from(2)).unwrap();
        assert_eq!(object.keys(), vec!["a", "b"]);
        assert_eq!(object.get("a").unwrap(), Value::from(2));
    }

    #[test]
    fn frozen_object_rejects_data_writes() {
        let object = ObjectRef::from_entries([("a", Value::from(1))]);
        object.freeze();
        assert_eq!(
            object.set("a", Value::from(2)).unwrap_err(),
            Error::FrozenWrite { key: "a".into() }
        );
        assert_eq!(
            object.set("b", Value::from(2)).unwrap_err(),
            Error::FrozenWrite { key: "b".into() }
        );
    }

    #[test]
    fn declared_field_materializes_on_first_write() {
        let class = Class::new("Model");
        class.observable("count", FieldOptions::default());
        let model = class.instantiate();

        assert!(matches!(
            model.get("count"),
            Err(Error::UninitializedAccess { ref key }) if key == "count"
        ));
        assert!(!model.is_materialized("count"));

        model.set("count", Value::from(1)).unwrap();
        let cell = model.cell("count").unwrap();
        model.set("count", Value::from(2)).unwrap();

        assert!(Arc::ptr_eq(&cell, &model.cell("count").unwrap()));
        assert_eq!(cell.peek(), Value::from(2));
    }

    #[test]
    fn array_operations_need_an_array_field() {
        let class = Class::new("Model");
        class.observable("title", FieldOptions::default());
        class.observable_array("items", FieldOptions::default());
        let model = class.instantiate();

        assert!(matches!(
            model.mutate("items", |_| {}),
            Err(Error::UninitializedAccess { .. })
        ));
        model.set("items", Value::from(vec![Value::from(1)])).unwrap();
        model.set("title", Value::from("t")).unwrap();

        assert_eq!(model.set_at("items", 0, Value::from(2)).unwrap(), Value::from(1));
        assert!(matches!(
            model.mutate("title", |_| {}),
            Err(Error::InvalidMutationTarget { .. })
        ));
        assert!(matches!(
            model.set_at("nothing", 0, Value::Null),
            Err(Error::InvalidMutationTarget { .. })
        ));
    }

    #[test]
    fn serialization_reads_current_values() {
        let class = Class::new("Model");
        class.observable("name", FieldOptions::default());
        let model = class.instantiate();
        model.set("name", Value::from("ada")).unwrap();
        model.set("skip", Value::Undefined).unwrap();
        model.set("handle", Value::Opaque(crate::value::Opaque::new(7u8))).unwrap();

        assert_eq!(
            Value::from(model).to_json().unwrap(),
            serde_json::json!({ "name": "ada" })
        );
    }

    #[test]
    fn debug_output_survives_cycles() {
        let object = ObjectRef::new();
        object.set("me", Value::from(object.clone())).unwrap();
        assert_eq!(format!("{object:?}"), r#"{"me": [Circular]}"#);
    }
}
