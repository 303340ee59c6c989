//! Class Metadata
//!
//! A [`Class`] records, per field key, how instances materialize that field:
//! as an observable, an observable array or a computed value, whether it is
//! deep or exposed, and which extenders wrap its cell.
//!
//! # Inheritance
//!
//! A derived class reads through to its parent until the first time it is
//! annotated itself. At that point it copies the parent's whole table and
//! owns the copy from then on, so annotating the derived class never changes
//! the parent.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::extend::ExtenderSpec;
use crate::object::{ObjectRef, Prototype};
use crate::value::Value;

/// Options of a reactive field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldOptions {
    /// Convert assigned plain objects and array elements recursively.
    pub deep: bool,
    /// Also expose the backing cell under [`exposed_name`](crate::exposed_name).
    pub expose: bool,
}

impl FieldOptions {
    pub fn deep() -> Self {
        Self { deep: true, expose: false }
    }

    pub fn exposed() -> Self {
        Self { deep: false, expose: true }
    }
}

/// Getter of a computed field, evaluated against the instance.
pub type Getter = Arc<dyn Fn(&ObjectRef) -> Result<Value> + Send + Sync>;

/// Setter of a computed field.
pub type Setter = Arc<dyn Fn(&ObjectRef, Value) -> Result<()> + Send + Sync>;

/// Accessor pair of a computed field.
#[derive(Clone)]
pub struct ComputedAccessors {
    pub getter: Getter,
    pub setter: Option<Setter>,
}

/// How a field is materialized.
#[derive(Clone)]
pub enum FieldKind {
    Observable,
    Array,
    Computed(ComputedAccessors),
}

impl Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Observable => f.write_str("Observable"),
            FieldKind::Array => f.write_str("Array"),
            FieldKind::Computed(accessors) => f
                .debug_struct("Computed")
                .field("writable", &accessors.setter.is_some())
                .finish(),
        }
    }
}

/// Everything a class declares about one field.
///
/// `kind` is `None` for a key that so far only carries extenders.
#[derive(Debug, Clone, Default)]
pub struct FieldDescriptor {
    pub kind: Option<FieldKind>,
    pub deep: bool,
    pub expose: bool,
    pub extenders: Vec<ExtenderSpec>,
}

impl FieldDescriptor {
    pub fn options(&self) -> FieldOptions {
        FieldOptions {
            deep: self.deep,
            expose: self.expose,
        }
    }

    pub fn is_reactive(&self) -> bool {
        self.kind.is_some()
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, Some(FieldKind::Array))
    }
}

type FieldTable = IndexMap<String, FieldDescriptor>;

/// A class: a named field table with an optional parent.
///
/// Cloning creates a new handle to the **same** class.
#[derive(Clone)]
pub struct Class {
    inner: Arc<ClassInner>,
}

struct ClassInner {
    id: u64,
    name: String,
    parent: Option<Class>,
    /// `None` until the class is annotated for the first time.
    fields: RwLock<Option<FieldTable>>,
}

impl Class {
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    /// Create a class deriving from `parent`.
    pub fn extends(name: impl Into<String>, parent: &Class) -> Self {
        Self::build(name.into(), Some(parent.clone()))
    }

    fn build(name: String, parent: Option<Class>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            inner: Arc::new(ClassInner {
                id: COUNTER.fetch_add(1, Ordering::Relaxed),
                name,
                parent,
                fields: RwLock::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<&Class> {
        self.inner.parent.as_ref()
    }

    pub fn ptr_eq(&self, other: &Class) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether this class is `other` or derives from it.
    pub fn is_subclass_of(&self, other: &Class) -> bool {
        let mut class = Some(self);
        while let Some(c) = class {
            if c.ptr_eq(other) {
                return true;
            }
            class = c.parent();
        }
        false
    }

    /// Declare `key` as an observable field.
    pub fn observable(&self, key: &str, options: FieldOptions) -> &Self {
        self.declare(key, FieldKind::Observable, options)
    }

    /// Declare `key` as an observable array field.
    pub fn observable_array(&self, key: &str, options: FieldOptions) -> &Self {
        self.declare(key, FieldKind::Array, options)
    }

    /// Declare `key` as a read-only computed field.
    pub fn computed<G>(&self, key: &str, getter: G) -> &Self
    where
        G: Fn(&ObjectRef) -> Result<Value> + Send + Sync + 'static,
    {
        let accessors = ComputedAccessors {
            getter: Arc::new(getter),
            setter: None,
        };
        self.declare(key, FieldKind::Computed(accessors), FieldOptions::default())
    }

    /// Declare `key` as a computed field whose writes go to `setter`.
    pub fn computed_with_setter<G, S>(&self, key: &str, getter: G, setter: S) -> &Self
    where
        G: Fn(&ObjectRef) -> Result<Value> + Send + Sync + 'static,
        S: Fn(&ObjectRef, Value) -> Result<()> + Send + Sync + 'static,
    {
        let accessors = ComputedAccessors {
            getter: Arc::new(getter),
            setter: Some(Arc::new(setter)),
        };
        self.declare(key, FieldKind::Computed(accessors), FieldOptions::default())
    }

    /// Append an extender to the field's list.
    pub fn add_extender(&self, key: &str, spec: impl Into<ExtenderSpec>) -> &Self {
        let spec = spec.into();
        self.edit(key, |descriptor| descriptor.extenders.push(spec));
        self
    }

    fn declare(&self, key: &str, kind: FieldKind, options: FieldOptions) -> &Self {
        debug!(class = %self.inner.name, key = %key, kind = ?kind, "field declared");
        self.edit(key, |descriptor| {
            descriptor.kind = Some(kind);
            descriptor.deep = options.deep;
            descriptor.expose = options.expose;
        });
        self
    }

    fn edit(&self, key: &str, f: impl FnOnce(&mut FieldDescriptor)) {
        // Snapshot the parent before taking our own lock.
        let seed = if self.inner.fields.read().is_none() {
            self.inner.parent.as_ref().map(Class::table)
        } else {
            None
        };

        let mut fields = self.inner.fields.write();
        let table = fields.get_or_insert_with(|| seed.unwrap_or_default());
        f(table.entry(key.to_string()).or_default());
    }

    /// The effective field table: own if annotated, otherwise inherited.
    fn table(&self) -> FieldTable {
        if let Some(table) = self.inner.fields.read().as_ref() {
            return table.clone();
        }
        self.inner
            .parent
            .as_ref()
            .map(Class::table)
            .unwrap_or_default()
    }

    /// Look up the descriptor of `key`.
    pub fn descriptor(&self, key: &str) -> Option<FieldDescriptor> {
        if let Some(table) = self.inner.fields.read().as_ref() {
            return table.get(key).cloned();
        }
        self.inner.parent.as_ref().and_then(|p| p.descriptor(key))
    }

    /// Declared keys, in declaration order.
    pub fn declared_keys(&self) -> Vec<String> {
        self.table().keys().cloned().collect()
    }

    /// Whether the class owns its table yet.
    pub fn has_own_metadata(&self) -> bool {
        self.inner.fields.read().is_some()
    }

    /// Create an empty instance. Fields materialize on use.
    pub fn instantiate(&self) -> ObjectRef {
        ObjectRef::with_prototype(Prototype::Class(self.clone()))
    }
}

impl Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("parent", &self.inner.parent.as_ref().map(Class::name))
            .finish()
    }
}
