//! Extender Chain
//!
//! An extender wraps a freshly created cell in another cell that still
//! honors the [`ReactiveCell`](crate::reactive::ReactiveCell) contract: validating writes, formatting
//! values, rate limiting notifications, or anything a host defines.
//!
//! # Ordering
//!
//! Extenders apply in declaration order. The first declared wraps the raw
//! cell, the next wraps the result, and so on, so the last declared sees
//! every earlier wrapper. The chain runs exactly once per field per
//! instance, when the field materializes.
//!
//! # Specs
//!
//! A class stores [`ExtenderSpec`]s. A spec is either a ready extender or a
//! factory that builds one from the instance being materialized, which lets
//! an extender depend on instance state.

mod format;
mod rate_limit;
mod validate;

use std::fmt::{self, Debug};
use std::sync::Arc;

use tracing::trace;

use crate::error::Result;
use crate::meta::Class;
use crate::object::ObjectRef;
use crate::reactive::CellRef;

pub use format::Format;
pub use rate_limit::{RateLimit, RateLimitMethod};
pub use validate::Validate;

/// A transformation applied to a field's cell when it is created.
pub trait Extender: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Wrap `cell`, the cell of field `key`. May return `cell` itself.
    fn extend(&self, key: &str, cell: CellRef) -> Result<CellRef>;
}

/// Builds an extender for one instance.
pub type ExtenderFactory = Arc<dyn Fn(&ObjectRef) -> Arc<dyn Extender> + Send + Sync>;

/// One entry of a field's extender list.
#[derive(Clone)]
pub enum ExtenderSpec {
    Static(Arc<dyn Extender>),
    Factory(ExtenderFactory),
}

impl ExtenderSpec {
    pub fn new(extender: impl Extender + 'static) -> Self {
        Self::Static(Arc::new(extender))
    }

    /// A spec evaluated against the instance at application time.
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&ObjectRef) -> Arc<dyn Extender> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(factory))
    }

    fn resolve(&self, instance: &ObjectRef) -> Arc<dyn Extender> {
        match self {
            ExtenderSpec::Static(extender) => extender.clone(),
            ExtenderSpec::Factory(factory) => factory(instance),
        }
    }
}

impl<E: Extender + 'static> From<E> for ExtenderSpec {
    fn from(extender: E) -> Self {
        Self::new(extender)
    }
}

impl Debug for ExtenderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtenderSpec::Static(extender) => write!(f, "Static({})", extender.name()),
            ExtenderSpec::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// Append `spec` to the extender list of `key` on `class`.
pub fn add_extender(class: &Class, key: &str, spec: impl Into<ExtenderSpec>) {
    class.add_extender(key, spec);
}

/// Run the extender chain declared for `key` over `cell`.
pub fn apply_extenders(instance: &ObjectRef, key: &str, cell: CellRef) -> Result<CellRef> {
    let specs = instance
        .class()
        .and_then(|c| c.descriptor(key))
        .map(|d| d.extenders)
        .unwrap_or_default();

    specs.iter().try_fold(cell, |cell, spec| {
        let extender = spec.resolve(instance);
        trace!(key = %key, extender = extender.name(), cell = %cell.id(), "applying extender");
        extender.extend(key, cell)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::FieldOptions;
    use crate::value::Value;
    use parking_lot::Mutex;

    /// Records its name into a shared log when applied.
    struct Tag {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Extender for Tag {
        fn name(&self) -> &str {
            &self.name
        }

        fn extend(&self, _key: &str, cell: CellRef) -> Result<CellRef> {
            self.log.lock().push(self.name.clone());
            Ok(cell)
        }
    }

    fn tag(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Tag {
        Tag {
            name: name.to_string(),
            log: log.clone(),
        }
    }

    #[test]
    fn extenders_apply_in_declaration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let class = Class::new("Model");
        class.observable("value", FieldOptions::default());
        add_extender(&class, "value", tag("first", &log));
        add_extender(&class, "value", tag("second", &log));

        let model = class.instantiate();
        model.set("value", Value::from(1)).unwrap();
        model.set("value", Value::from(2)).unwrap();
        model.get("value").unwrap();

        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn factories_see_the_instance() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let class = Class::new("Model");
        class.observable("value", FieldOptions::default());

        let l = log.clone();
        class.add_extender(
            "value",
            ExtenderSpec::factory(move |instance| {
                let name = instance
                    .get("label")
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                Arc::new(Tag { name, log: l.clone() }) as Arc<dyn Extender>
            }),
        );

        let a = class.instantiate();
        a.set("label", Value::from("a")).unwrap();
        a.set("value", Value::from(1)).unwrap();
        let b = class.instantiate();
        b.set("label", Value::from("b")).unwrap();
        b.set("value", Value::from(1)).unwrap();

        assert_eq!(*log.lock(), vec!["a", "b"]);
    }

    #[test]
    fn spec_debug_names_static_extenders() {
        let spec = ExtenderSpec::from(Format::new(|v| v));
        assert_eq!(format!("{spec:?}"), "Static(format)");
    }
}
