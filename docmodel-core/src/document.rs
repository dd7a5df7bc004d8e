//! Reserved document fields and conversions between caller types and BSON documents.
//!
//! Model operations accept anything that implements [`Serialize`] (a `bson::doc!`,
//! a `serde_json::Value`, a plain struct) and hand back [`Document`]s, which can be
//! turned into caller types again with [`from_document`].

use bson::{
    Bson, Document,
    de::deserialize_from_bson,
    oid::ObjectId,
    ser::serialize_to_bson,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{ModelError, ModelResult};

/// Primary identifier field.
pub const ID: &str = "_id";
/// Soft-delete flag.
pub const IS_DELETED: &str = "IsDeleted";
/// Creation time in epoch seconds.
pub const CREATED_AT: &str = "CreatedAt";
/// Creation time, human readable.
pub const CREATED_AT_FMT: &str = "CreatedAtFmt";
/// Identifier of the actor that created the document.
pub const CREATED_BY: &str = "CreatedBy";
/// Last update time in epoch seconds.
pub const UPDATED_AT: &str = "UpdatedAt";
/// Last update time, human readable.
pub const UPDATED_AT_FMT: &str = "UpdatedAtFmt";
/// Identifier of the actor that last updated the document.
pub const UPDATED_BY: &str = "UpdatedBy";

/// Fields that can never be written through an update or a soft remove.
pub const PROTECTED_FIELDS: [&str; 4] = [ID, CREATED_AT, CREATED_AT_FMT, CREATED_BY];

/// Converts any serializable value into a single document.
///
/// # Errors
///
/// Returns [`ModelError::InvalidDocument`] if the value does not serialize to a document.
pub fn to_document<T: Serialize + ?Sized>(value: &T) -> ModelResult<Document> {
    match serialize_to_bson(value)? {
        Bson::Document(doc) => Ok(doc),
        Bson::Null => Ok(Document::new()),
        other => Err(ModelError::InvalidDocument(format!(
            "expected a document, got {:?}",
            other.element_type()
        ))),
    }
}

/// Converts a value that is either one document or an array of documents.
///
/// # Errors
///
/// Returns [`ModelError::InvalidDocument`] if the value, or any array element, is not a document.
pub fn to_documents<T: Serialize + ?Sized>(value: &T) -> ModelResult<Vec<Document>> {
    match serialize_to_bson(value)? {
        Bson::Document(doc) => Ok(vec![doc]),
        Bson::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Bson::Document(doc) => Ok(doc),
                other => Err(ModelError::InvalidDocument(format!(
                    "expected an array of documents, found {:?}",
                    other.element_type()
                ))),
            })
            .collect(),
        other => Err(ModelError::InvalidDocument(format!(
            "expected a document or an array of documents, got {:?}",
            other.element_type()
        ))),
    }
}

/// Deserializes a document into a caller type.
///
/// # Errors
///
/// Returns an error if the document does not match the shape of `T`.
pub fn from_document<T: DeserializeOwned>(document: Document) -> ModelResult<T> {
    Ok(deserialize_from_bson(Bson::Document(document))?)
}

/// Returns the native identifier of a document, if it has one.
pub fn document_id(document: &Document) -> Option<ObjectId> {
    document.get_object_id(ID).ok()
}

/// Returns `true` if the document is flagged as soft-deleted.
pub fn is_deleted(document: &Document) -> bool {
    matches!(document.get(IS_DELETED), Some(Bson::Boolean(true)))
}
