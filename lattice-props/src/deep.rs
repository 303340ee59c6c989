//! Deep Conversion
//!
//! Turns a plain object graph into a reactive one in place. Every data key of
//! a plain record becomes a deep reactive property, which in turn converts
//! whatever is assigned to it, so the conversion reaches the whole graph.
//!
//! Converted records are tagged in a side-table keyed by [`ObjectId`]. The
//! tag is checked before descending, which is what makes the conversion
//! idempotent and lets it terminate on cycles. The tag is dropped together
//! with the object.

use std::sync::OnceLock;

use dashmap::DashSet;
use tracing::debug;

use crate::error::{Error, Result};
use crate::materialize::materialize_property;
use crate::meta::FieldOptions;
use crate::object::{ObjectId, ObjectRef};
use crate::value::Value;

fn converted() -> &'static DashSet<ObjectId> {
    static CONVERTED: OnceLock<DashSet<ObjectId>> = OnceLock::new();
    CONVERTED.get_or_init(DashSet::new)
}

/// Prepare `value` for storage in a deep reactive field named `key`.
///
/// - Primitives, arrays and opaque values pass through unchanged. Arrays are
///   converted by the array field that receives them.
/// - Plain records are converted in place and returned.
/// - Class instances pass through unchanged.
///
/// Fails with [`Error::ImmutableTargetConversion`] for a frozen record that
/// has not been converted yet.
pub fn prepare_reactive_value(value: Value, key: &str) -> Result<Value> {
    let Value::Object(object) = &value else {
        return Ok(value);
    };
    if !object.is_plain_record() || is_reactive_object(object) {
        return Ok(value);
    }
    if object.is_frozen() {
        return Err(Error::ImmutableTargetConversion { key: key.to_string() });
    }

    let entries = object.data_entries();
    if let Some((field, _)) = entries.iter().find(|(_, item)| is_unconvertible(item)) {
        return Err(Error::ImmutableTargetConversion { key: field.clone() });
    }
    if !converted().insert(object.id()) {
        return Ok(value);
    }

    debug!(key = %key, object = %object.id(), fields = entries.len(), "converting object to reactive");
    for (field, item) in entries {
        if let Err(err) = materialize_property(object, &field, item, FieldOptions::deep()) {
            // Untag so the next assignment converts the remaining keys.
            converted().remove(&object.id());
            debug!(key = %key, object = %object.id(), field = %field, error = %err, "conversion failed");
            return Err(err);
        }
    }
    Ok(value)
}

/// A frozen plain record that has not been converted yet.
fn is_unconvertible(value: &Value) -> bool {
    matches!(value, Value::Object(object)
        if object.is_plain_record() && object.is_frozen() && !is_reactive_object(object))
}

/// Whether `object` has already been converted.
pub fn is_reactive_object(object: &ObjectRef) -> bool {
    converted().contains(&object.id())
}

pub(crate) fn forget(id: ObjectId) {
    converted().remove(&id);
}
