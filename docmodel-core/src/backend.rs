//! Storage backend abstraction for the model engine.
//!
//! A [`StoreBackend`] hands out one [`StoreSession`] per model operation. The
//! session is the only way to touch the store: it is acquired when the operation
//! starts and dropped when the operation returns, whether it succeeded or not,
//! so nothing is held across operations or shared between concurrent calls.
//!
//! Implementations are required to be thread-safe (`Send + Sync`); sessions only
//! need to be `Send` since each belongs to a single operation.
//!
//! ```ignore
//! use docmodel::backend::{StoreBackend, StoreSession};
//! use docmodel::query::{FindQuery, Filter};
//! use bson::doc;
//!
//! let mut session = backend.acquire().await?;
//! session.insert("users", vec![doc! { "_id": id, "name": "Alice" }]).await?;
//! let found = session.find("users", FindQuery::new(Filter::eq("name", "Alice"))).await?;
//! ```

use async_trait::async_trait;
use bson::Document;
use std::fmt::Debug;

use crate::{
    error::ModelResult,
    query::{Cond, FindQuery},
};

/// Abstract interface for document storage backends.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Session type handed to a single operation.
    type Session: StoreSession;

    /// Acquires a session for one operation. Dropping the session releases it.
    async fn acquire(&self) -> ModelResult<Self::Session>;

    /// Shuts down the backend and releases its resources.
    async fn shutdown(self) -> ModelResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Store access scoped to one operation.
///
/// Filters arrive with identifiers already normalized; sessions never rewrite
/// conditions.
#[async_trait]
pub trait StoreSession: Send {
    /// Inserts documents; every document carries its `_id`.
    async fn insert(&mut self, collection: &str, documents: Vec<Document>) -> ModelResult<()>;

    /// Returns the documents matching a query, in query order.
    async fn find(&mut self, collection: &str, query: FindQuery) -> ModelResult<Vec<Document>>;

    /// Counts documents matching a filter.
    async fn count(&mut self, collection: &str, filter: &Cond) -> ModelResult<u64>;

    /// Applies an update operator document (`$set`, `$unset`, `$inc`) to the
    /// first match, or to every match when `multi` is set.
    ///
    /// Returns the number of matched documents.
    async fn update(
        &mut self,
        collection: &str,
        filter: &Cond,
        update: Document,
        multi: bool,
    ) -> ModelResult<u64>;

    /// Deletes the first match, or every match when `multi` is set.
    ///
    /// Returns the number of deleted documents.
    async fn delete(&mut self, collection: &str, filter: &Cond, multi: bool) -> ModelResult<u64>;

    /// Returns the first document matching a query.
    async fn find_one(
        &mut self,
        collection: &str,
        query: FindQuery,
    ) -> ModelResult<Option<Document>> {
        let query = FindQuery { limit: Some(1), ..query };

        Ok(self.find(collection, query).await?.into_iter().next())
    }
}

/// Factory trait for constructing backends.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> ModelResult<Self::Backend>;
}
