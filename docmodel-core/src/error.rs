//! Error types and result types for model operations.
//!
//! Every fallible operation in this crate returns [`ModelResult<T>`]. An empty
//! result (nothing matched a `one`, `id` or `list` call) is never an error.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::scope::Hook;

/// Boxed error type returned by hook callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Represents all possible errors that can occur when running a model operation.
#[derive(Error, Debug)]
pub enum ModelError {
    /// An entity-form mutation (or an `id` lookup) was issued without the field it is keyed on.
    #[error("{0} is required")]
    RequiredFieldMissing(String),
    /// A string could not be parsed into a native document identifier.
    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(String),
    /// A lifecycle hook returned a failure; the remaining pipeline steps were skipped.
    #[error("Hook {hook} aborted the operation: {source}")]
    HookAborted {
        /// The hook that failed.
        hook: Hook,
        /// The error returned by the hook.
        #[source]
        source: BoxError,
    },
    /// The underlying store rejected or failed a call.
    #[error("Store failure: {0}")]
    StoreFailure(String),
    /// The condition tree has an invalid shape.
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),
    /// The loosely-typed query parameters could not be resolved.
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    /// The input is not a document (or an array of documents).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A schema registration is inconsistent (unknown relation target, cycle, duplicate name).
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    /// No schema is registered under the requested name.
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A specialized `Result` type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

impl ModelError {
    /// Returns `true` if this error was raised by a lifecycle hook.
    pub fn is_hook_abort(&self) -> bool {
        matches!(self, ModelError::HookAborted { .. })
    }
}

impl From<BsonError> for ModelError {
    fn from(err: BsonError) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for ModelError {
    fn from(err: SerdeJsonError) -> Self {
        ModelError::Serialization(err.to_string())
    }
}
