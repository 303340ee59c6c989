//! Reactive Property Materializer
//!
//! Materializing a field builds its backing cell, runs the field's extender
//! chain over it once, and installs the result as the field's slot on the
//! instance. From then on every read and write of the field goes through
//! that cell.
//!
//! Observable and array fields materialize on their first write, computed
//! fields on their first access. A field is materialized at most once per
//! instance: the slot itself is the marker.

use std::sync::Arc;

use tracing::debug;

use crate::array::ArrayRef;
use crate::deep::prepare_reactive_value;
use crate::error::{Error, Result};
use crate::extend::apply_extenders;
use crate::meta::{ComputedAccessors, FieldOptions};
use crate::object::{ObjectRef, Property};
use crate::reactive::{ArraySignal, CellRef, ComputeFn, Memo, Signal, WriteFn};
use crate::value::Value;

/// Name of the hidden entry exposing the cell of `key`.
pub fn exposed_name(key: &str) -> String {
    format!("{key}$")
}

/// Materialize `key` on `instance` with `initial` as its first value.
///
/// Array values, and fields declared as arrays, are handed to
/// [`materialize_array`]. Returns the installed cell.
pub fn materialize_property(
    instance: &ObjectRef,
    key: &str,
    initial: Value,
    options: FieldOptions,
) -> Result<CellRef> {
    let declared_array = instance
        .class()
        .and_then(|c| c.descriptor(key))
        .is_some_and(|d| d.is_array());
    if declared_array || matches!(initial, Value::Array(_)) {
        return materialize_array(instance, key, initial, options);
    }

    let initial = if options.deep {
        prepare_reactive_value(initial, key)?
    } else {
        initial
    };
    // The first value goes through the finished chain, so extenders see it.
    let signal: CellRef = Arc::new(Signal::named(key, Value::Undefined));
    let cell = apply_extenders(instance, key, signal)?;
    cell.write(initial)?;
    debug!(object = %instance.id(), key = %key, deep = options.deep, "property materialized");
    install(instance, key, cell, options)
}

/// Materialize the array field `key` on `instance`.
///
/// `Undefined` starts the field with an empty array. Any other non-array
/// value fails with [`Error::NotAnArray`].
pub fn materialize_array(
    instance: &ObjectRef,
    key: &str,
    initial: Value,
    options: FieldOptions,
) -> Result<CellRef> {
    let array = match initial {
        Value::Array(array) => array,
        Value::Undefined => ArrayRef::new(),
        _ => return Err(Error::NotAnArray { key: key.to_string() }),
    };
    let signal: CellRef = Arc::new(ArraySignal::with_array(key, array, options.deep)?);
    let cell = apply_extenders(instance, key, signal)?;
    debug!(object = %instance.id(), key = %key, deep = options.deep, "array property materialized");
    install(instance, key, cell, options)
}

/// Materialize the computed field `key`. The memo holds the instance weakly.
pub(crate) fn materialize_computed(
    instance: &ObjectRef,
    key: &str,
    accessors: ComputedAccessors,
    expose: bool,
) -> Result<CellRef> {
    let weak = instance.downgrade();
    let getter = accessors.getter;
    let compute: ComputeFn = Arc::new(move || match weak.upgrade() {
        Some(object) => getter(&object),
        None => Ok(Value::Undefined),
    });

    let write: Option<WriteFn> = accessors.setter.map(|setter| {
        let weak = instance.downgrade();
        let write: WriteFn = Arc::new(move |value| match weak.upgrade() {
            Some(object) => setter(&object, value),
            None => Ok(()),
        });
        write
    });

    let memo: CellRef = Arc::new(Memo::build(Some(key.into()), compute, write));
    let cell = apply_extenders(instance, key, memo)?;
    debug!(object = %instance.id(), key = %key, "computed property materialized");
    install(
        instance,
        key,
        cell,
        FieldOptions {
            deep: false,
            expose,
        },
    )
}

fn install(instance: &ObjectRef, key: &str, cell: CellRef, options: FieldOptions) -> Result<CellRef> {
    let property = Property {
        cell,
        deep: options.deep,
    };
    let installed = instance.install(key, property, options.expose)?;
    Ok(installed)
}
