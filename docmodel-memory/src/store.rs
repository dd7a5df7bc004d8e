//! In-memory storage implementation for the model engine.
//!
//! Documents are kept as BSON documents per collection, in insertion order,
//! behind an async-safe read-write lock.

use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
    },
};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document};

use docmodel_core::{
    backend::{StoreBackend, StoreBackendBuilder, StoreSession},
    document::ID,
    error::{ModelError, ModelResult},
    query::{Cond, FindQuery, Projection, Sort, SortDirection},
};

use crate::evaluator::{Comparable, DocumentEvaluator, lookup};

type CollectionVec = Vec<Document>;
type StoreMap = HashMap<String, CollectionVec>;


/// Thread-safe in-memory document storage backend.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data and the same session counter.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing). For small to medium
/// datasets this is typically acceptable. For larger datasets, use a persistent
/// backend like MongoDB.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
/// use docmodel::backend::{StoreBackend, StoreSession};
/// use bson::{doc, oid::ObjectId};
///
/// let store = InMemoryStore::new();
/// let mut session = store.acquire().await?;
/// session.insert("users", vec![doc! { "_id": ObjectId::new(), "name": "Alice" }]).await?;
/// drop(session);
///
/// assert_eq!(store.documents("users").await.len(), 1);
/// assert_eq!(store.active_sessions(), 0);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// The main storage map: collection_name -> documents
    store: Arc<RwLock<StoreMap>>,
    /// Number of sessions handed out and not yet dropped
    sessions: Arc<AtomicUsize>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Number of sessions currently held by running operations.
    pub fn active_sessions(&self) -> usize {
        self.sessions.load(AtomicOrdering::SeqCst)
    }

    /// Snapshot of every document of a collection, deleted or not, in insertion order.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.store
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}


#[async_trait]
impl StoreBackend for InMemoryStore {
    type Session = InMemorySession;

    async fn acquire(&self) -> ModelResult<Self::Session> {
        self.sessions.fetch_add(1, AtomicOrdering::SeqCst);

        Ok(InMemorySession {
            store: self.store.clone(),
            sessions: self.sessions.clone(),
        })
    }
}


/// A session over an [`InMemoryStore`]; releases itself when dropped.
#[derive(Debug)]
pub struct InMemorySession {
    store: Arc<RwLock<StoreMap>>,
    sessions: Arc<AtomicUsize>,
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        self.sessions.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl StoreSession for InMemorySession {
    async fn insert(&mut self, collection: &str, documents: Vec<Document>) -> ModelResult<()> {
        let mut store = self.store.write().await;
        let existing = store
            .entry(collection.to_string())
            .or_default();

        let mut ids: Vec<&Bson> = existing.iter().filter_map(|doc| doc.get(ID)).collect();
        for doc in &documents {
            let id = doc
                .get(ID)
                .ok_or_else(|| {
                    ModelError::StoreFailure(format!("document without {ID} in {collection}"))
                })?;

            if ids.contains(&id) {
                return Err(ModelError::StoreFailure(format!(
                    "duplicate {ID} {id} in {collection}"
                )));
            }
            ids.push(id);
        }

        tracing::trace!(collection, count = documents.len(), "inserting into memory");
        existing.extend(documents);

        Ok(())
    }

    async fn find(&mut self, collection: &str, query: FindQuery) -> ModelResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut matched = DocumentEvaluator::filter_documents(documents, &query.filter)?;

        if !query.sort.is_empty() {
            matched.sort_by(|a, b| compare(a, b, &query.sort));
        }

        let skip = query.skip.unwrap_or(0) as usize;
        let limit = match query.limit {
            Some(0) | None => usize::MAX,
            Some(limit) => limit as usize,
        };

        Ok(
            matched
                .into_iter()
                .skip(skip)
                .take(limit)
                .map(|doc| project(doc, query.projection.as_ref()))
                .collect()
        )
    }

    async fn count(&mut self, collection: &str, filter: &Cond) -> ModelResult<u64> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(0);
        };

        Ok(DocumentEvaluator::filter_documents(documents, filter)?.len() as u64)
    }

    async fn update(
        &mut self,
        collection: &str,
        filter: &Cond,
        update: Document,
        multi: bool,
    ) -> ModelResult<u64> {
        let operations = UpdateOperations::parse(update)?;

        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        let targets = matching(documents, filter, multi)?;

        for index in &targets {
            operations.apply(&mut documents[*index])?;
        }

        tracing::trace!(collection, matched = targets.len(), "updated in memory");

        Ok(targets.len() as u64)
    }

    async fn delete(&mut self, collection: &str, filter: &Cond, multi: bool) -> ModelResult<u64> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        let targets = matching(documents, filter, multi)?;
        let deleted = targets.len() as u64;

        let mut index = 0;
        documents.retain(|_| {
            let keep = !targets.contains(&index);
            index += 1;
            keep
        });

        tracing::trace!(collection, deleted, "deleted from memory");

        Ok(deleted)
    }
}

/// Positions of the documents matching `filter`; only the first one unless `multi`.
fn matching(documents: &[Document], filter: &Cond, multi: bool) -> ModelResult<Vec<usize>> {
    let mut evaluator = DocumentEvaluator::new();
    let mut targets = Vec::new();

    for (index, doc) in documents.iter().enumerate() {
        if evaluator.evaluate(doc, filter)? {
            targets.push(index);
            if !multi {
                break;
            }
        }
    }

    Ok(targets)
}

fn compare(a: &Document, b: &Document, sort: &[Sort]) -> Ordering {
    for key in sort {
        let left = lookup(a, &key.field).map(Comparable::from).unwrap_or(Comparable::Null);
        let right = lookup(b, &key.field).map(Comparable::from).unwrap_or(Comparable::Null);

        let ordering = match key.direction {
            SortDirection::Asc => left.sort_cmp(&right),
            SortDirection::Desc => right.sort_cmp(&left),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

fn project(doc: &Document, projection: Option<&Projection>) -> Document {
    match projection {
        Some(projection) => doc
            .iter()
            .filter(|(field, _)| projection.allows(field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect(),
        None => doc.clone(),
    }
}


/// The update operators supported by the in-memory store.
#[derive(Debug, Default)]
struct UpdateOperations {
    set: Document,
    unset: Vec<String>,
    inc: Document,
}

impl UpdateOperations {
    fn parse(update: Document) -> ModelResult<Self> {
        let mut operations = UpdateOperations::default();

        for (operator, fields) in update {
            let Bson::Document(fields) = fields else {
                return Err(ModelError::StoreFailure(format!("{operator} expects a document")));
            };

            match operator.as_str() {
                "$set" => operations.set = fields,
                "$unset" => operations.unset = fields.into_iter().map(|(field, _)| field).collect(),
                "$inc" => {
                    if let Some((field, _)) = fields
                        .iter()
                        .find(|(_, value)| {
                            !matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
                        })
                    {
                        return Err(ModelError::StoreFailure(format!(
                            "$inc.{field} must be a number"
                        )));
                    }
                    operations.inc = fields;
                },
                other => {
                    return Err(ModelError::StoreFailure(format!(
                        "update operator not supported by the in-memory store: {other}"
                    )));
                },
            }
        }

        Ok(operations)
    }

    fn apply(&self, doc: &mut Document) -> ModelResult<()> {
        for (field, value) in &self.set {
            set_path(doc, field, value.clone())?;
        }
        for field in &self.unset {
            unset_path(doc, field);
        }
        for (field, delta) in &self.inc {
            let current = lookup(doc, field).cloned().unwrap_or(Bson::Int32(0));
            set_path(doc, field, add(field, &current, delta)?)?;
        }

        Ok(())
    }
}

fn set_path(doc: &mut Document, path: &str, value: Bson) -> ModelResult<()> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        },
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                if doc.get(head).is_some_and(|existing| !matches!(existing, Bson::Null)) {
                    return Err(ModelError::StoreFailure(format!(
                        "cannot create field {rest} inside non-document {head}"
                    )));
                }
                doc.insert(head, Document::new());
            }

            match doc.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(ModelError::StoreFailure(format!("cannot set {path}"))),
            }
        },
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        },
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                unset_path(inner, rest);
            }
        },
    }
}

fn add(field: &str, current: &Bson, delta: &Bson) -> ModelResult<Bson> {
    Ok(match (current, delta) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(*a as i64 + *b as i64),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(*a as i64 + b),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + *b as i64),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        (Bson::Double(a), Bson::Int32(b)) => Bson::Double(a + *b as f64),
        (Bson::Double(a), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Bson::Int32(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        (Bson::Int64(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        _ => {
            return Err(ModelError::StoreFailure(format!(
                "cannot apply $inc to non-numeric field {field}"
            )));
        },
    })
}


/// Builder for constructing [`InMemoryStore`] instances.
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
/// use docmodel::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance.
    ///
    /// This always succeeds and returns a freshly initialized store.
    async fn build(self) -> ModelResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use docmodel_core::query::Filter;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn sessions_are_counted_until_dropped() {
        let store = InMemoryStore::new();

        let first = store.acquire().await.unwrap();
        let second = store.acquire().await.unwrap();
        assert_eq!(store.active_sessions(), 2);

        drop(first);
        drop(second);
        assert_eq!(store.active_sessions(), 0);
    }

    #[tokio::test]
    async fn rejects_duplicate_ids() {
        let store = InMemoryStore::new();
        let mut session = store.acquire().await.unwrap();
        let id = ObjectId::new();

        session.insert("users", vec![doc! { "_id": id }]).await.unwrap();
        let result = session
            .insert("users", vec![doc! { "_id": ObjectId::new() }, doc! { "_id": id }])
            .await;

        assert!(matches!(result, Err(ModelError::StoreFailure(_))));
        assert_eq!(store.documents("users").await.len(), 1);
    }

    #[tokio::test]
    async fn find_sorts_pages_and_projects() {
        let store = InMemoryStore::new();
        let mut session = store.acquire().await.unwrap();

        let documents = (0..5)
            .map(|n| doc! { "_id": ObjectId::new(), "n": n, "group": n % 2, "secret": "x" })
            .collect();
        session.insert("items", documents).await.unwrap();

        let query = FindQuery::builder()
            .sort("group", SortDirection::Asc)
            .sort("n", SortDirection::Desc)
            .projection(Some(Projection::new().exclude("secret").exclude("_id")))
            .skip(1)
            .limit(3)
            .build();

        let found = session.find("items", query).await.unwrap();
        assert_eq!(
            found,
            vec![
                doc! { "n": 2, "group": 0 },
                doc! { "n": 0, "group": 0 },
                doc! { "n": 3, "group": 1 },
            ]
        );
    }

    #[tokio::test]
    async fn update_applies_operators_to_first_or_all() {
        let store = InMemoryStore::new();
        let mut session = store.acquire().await.unwrap();
        session
            .insert("items", vec![
                doc! { "_id": ObjectId::new(), "kind": "a", "hits": 1, "tmp": true },
                doc! { "_id": ObjectId::new(), "kind": "a", "hits": 1, "tmp": true },
            ])
            .await
            .unwrap();

        let update = doc! {
            "$set": { "meta.seen": true },
            "$unset": { "tmp": "" },
            "$inc": { "hits": 2 },
        };
        let matched = session
            .update("items", &Filter::eq("kind", "a"), update.clone(), false)
            .await
            .unwrap();
        assert_eq!(matched, 1);

        let documents = store.documents("items").await;
        assert_eq!(documents[0].get_i32("hits").unwrap(), 3);
        assert!(documents[0].get_document("meta").unwrap().get_bool("seen").unwrap());
        assert!(!documents[0].contains_key("tmp"));
        assert!(documents[1].contains_key("tmp"));

        let matched = session
            .update("items", &Filter::eq("kind", "a"), update, true)
            .await
            .unwrap();
        assert_eq!(matched, 2);
    }

    #[tokio::test]
    async fn delete_removes_first_or_all() {
        let store = InMemoryStore::new();
        let mut session = store.acquire().await.unwrap();
        let documents = (0..3).map(|n| doc! { "_id": ObjectId::new(), "n": n }).collect();
        session.insert("items", documents).await.unwrap();

        assert_eq!(session.delete("items", &Filter::gte("n", 1), false).await.unwrap(), 1);
        assert_eq!(store.documents("items").await.len(), 2);

        assert_eq!(session.delete("items", &Cond::default(), true).await.unwrap(), 2);
        assert_eq!(session.delete("missing", &Cond::default(), true).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unsupported_operators_fail() {
        let store = InMemoryStore::new();
        let mut session = store.acquire().await.unwrap();
        session.insert("items", vec![doc! { "_id": ObjectId::new() }]).await.unwrap();

        let result = session
            .update("items", &Cond::default(), doc! { "$push": { "tags": "x" } }, true)
            .await;
        assert!(matches!(result, Err(ModelError::StoreFailure(_))));
    }
}
