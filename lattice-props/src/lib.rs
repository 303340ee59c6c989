//! Lattice Props
//!
//! This crate turns a mutable object/array graph into a reactive one: every
//! read can be tracked and every write produces fine-grained change
//! notifications. It implements:
//!
//! - Lazy materialization of reactive fields on class instances
//! - Deep, cycle-safe conversion of plain object graphs
//! - Observable arrays that report each mutation as ordered change records
//! - Extender chains wrapping a field's cell when it is created
//! - Per-instance subscription ledgers with bulk disposal
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`, `object`, `array`: the dynamic value model
//! - `reactive`: cells (signals, observable arrays, memos) and dependency tracking
//! - `diff`: change records for array mutations
//! - `meta`: per-class field declarations
//! - `materialize`, `deep`: turning fields and graphs reactive
//! - `extend`: the extender chain and built-in extenders
//! - `ledger`: subscriptions and disposal
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice_props::{Class, Disposable, FieldOptions, SubscribeOptions, Target, Value};
//!
//! let todo = Class::new("Todo");
//! todo.observable("title", FieldOptions::default())
//!     .observable_array("tags", FieldOptions::deep());
//!
//! let item = todo.instantiate();
//! item.set("title", Value::from("write docs"))?;
//! item.set("tags", Value::from(vec![Value::from("docs")]))?;
//!
//! let title = item.cell("title").unwrap();
//! item.subscribe(Target::Cell(title), SubscribeOptions::default(), |payload| {
//!     println!("title is now {:?}", payload.value());
//! })?;
//!
//! item.set("title", Value::from("ship it"))?;
//! // Prints: title is now Some("ship it")
//!
//! item.dispose();
//! ```

pub mod array;
pub mod deep;
pub mod diff;
pub mod error;
pub mod extend;
pub mod ledger;
pub mod materialize;
pub mod meta;
pub mod object;
pub mod reactive;
pub mod value;

pub use array::ArrayRef;
pub use deep::{is_reactive_object, prepare_reactive_value};
pub use diff::{ChangeRecord, ChangeSet, ChangeStatus};
pub use error::{Error, Result};
pub use extend::{add_extender, apply_extenders, Extender, ExtenderSpec};
pub use ledger::{subscribe, Disposable, Ledger, SubscribeOptions, Target};
pub use materialize::{exposed_name, materialize_array, materialize_property};
pub use meta::{Class, FieldDescriptor, FieldKind, FieldOptions};
pub use object::{ObjectId, ObjectRef, Prototype, WeakObjectRef};
pub use reactive::{ArraySignal, CellRef, Event, Memo, Payload, ReactiveCell, Signal, Subscription};
pub use value::{Opaque, Value};
