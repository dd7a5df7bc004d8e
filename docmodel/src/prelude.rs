//! Convenient re-exports of commonly used types from docmodel.
//!
//! ```ignore
//! use docmodel::prelude::*;
//! ```

pub use bson::{Bson, Document as BsonDocument, doc, oid::ObjectId};

pub use docmodel_core::{
    backend::{StoreBackend, StoreBackendBuilder, StoreSession},
    document::{document_id, from_document, is_deleted, to_document},
    error::{ModelError, ModelResult},
    model::Model,
    page::ListResult,
    params::{IntoIdParams, IntoParams, Params, Range},
    query::{Cond, FieldOp, Filter, FindQuery, Projection, Sort, SortDirection},
    schema::{FieldKind, HookResult, Schema, SchemaBuilder, SchemaRegistry},
    scope::{Hook, Operation, Scope},
    store::{ModelStore, StoreOptions},
};
