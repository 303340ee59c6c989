//! Error types for the property engine.
//!
//! Every failure here is a contract violation by the caller. Nothing is
//! retried and nothing is recovered internally: the error surfaces at the
//! call that caused it and always names the offending field.

use thiserror::Error;

/// Errors raised by reactive properties, arrays and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A reactive field was read before anything was assigned to it.
    #[error("reactive property `{key}` was read before it was assigned")]
    UninitializedAccess { key: String },

    /// An array-only operation was requested on something that is not an
    /// observable array.
    #[error("`{operation}` requires an observable array, but `{target}` is not one")]
    InvalidMutationTarget { target: String, operation: String },

    /// Deep conversion hit a frozen plain object.
    #[error("cannot make `{key}` deeply reactive: the assigned object is frozen")]
    ImmutableTargetConversion { key: String },

    /// A computed field without a setter was written.
    #[error("computed property `{key}` has no setter")]
    GetterOnlyWrite { key: String },

    /// A non-array value was assigned to an array field.
    #[error("observable array `{key}` can only hold arrays")]
    NotAnArray { key: String },

    /// A plain data slot of a frozen object was written.
    #[error("cannot assign `{key}`: the object is frozen")]
    FrozenWrite { key: String },

    /// A validation extender rejected the written value.
    #[error("invalid value for `{key}`: {message}")]
    Validation { key: String, message: String },

    /// Conversion to or from JSON / MessagePack failed.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl Error {
    pub(crate) fn invalid_target(target: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::InvalidMutationTarget {
            target: target.into(),
            operation: operation.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
