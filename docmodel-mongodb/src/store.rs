use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Bson, Document};
use mongodb::{
    Client, ClientSession, Collection as MongoCollection, Database,
    options::ClientOptions,
};
use docmodel_core::{
    backend::{StoreBackend, StoreBackendBuilder, StoreSession},
    error::{ModelError, ModelResult},
    query::{Cond, FindQuery, Sort, SortDirection},
};


/// MongoDB storage backend.
///
/// Every model operation runs on its own driver session, started in
/// [`StoreBackend::acquire`] and ended when the returned [`MongoSession`] is
/// dropped.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    /// The database all collections live in.
    pub fn database(&self) -> Database {
        self.client.database(&self.database)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    type Session = MongoSession;

    async fn acquire(&self) -> ModelResult<MongoSession> {
        let session = self
            .client
            .start_session()
            .await
            .map_err(|e| ModelError::StoreFailure(e.to_string()))?;

        Ok(MongoSession { session, database: self.database() })
    }

    async fn shutdown(self) -> ModelResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// A driver session bound to one model operation.
#[derive(Debug)]
pub struct MongoSession {
    session: ClientSession,
    database: Database,
}

impl MongoSession {
    fn collection(&self, name: &str) -> MongoCollection<Document> {
        self.database.collection(name)
    }
}

#[async_trait]
impl StoreSession for MongoSession {
    async fn insert(&mut self, collection: &str, documents: Vec<Document>) -> ModelResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        self.collection(collection)
            .insert_many(documents)
            .session(&mut self.session)
            .await
            .map_err(|e| ModelError::StoreFailure(e.to_string()))?;

        Ok(())
    }

    async fn find(&mut self, collection: &str, query: FindQuery) -> ModelResult<Vec<Document>> {
        let filter = query.filter.to_document()?;
        let collection = self.collection(collection);
        let mut find = collection.find(filter);

        if let Some(projection) = &query.projection {
            find = find.projection(projection.to_document());
        }
        if !query.sort.is_empty() {
            find = find.sort(sort_document(&query.sort));
        }
        if let Some(skip) = query.skip.filter(|skip| *skip > 0) {
            find = find.skip(skip);
        }
        if let Some(limit) = query.limit.filter(|limit| *limit > 0) {
            find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let mut cursor = find
            .session(&mut self.session)
            .await
            .map_err(|e| ModelError::StoreFailure(e.to_string()))?;

        cursor
            .stream(&mut self.session)
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| ModelError::StoreFailure(e.to_string()))
    }

    async fn count(&mut self, collection: &str, filter: &Cond) -> ModelResult<u64> {
        self.collection(collection)
            .count_documents(filter.to_document()?)
            .session(&mut self.session)
            .await
            .map_err(|e| ModelError::StoreFailure(e.to_string()))
    }

    async fn update(
        &mut self,
        collection: &str,
        filter: &Cond,
        update: Document,
        multi: bool,
    ) -> ModelResult<u64> {
        let filter = filter.to_document()?;
        let collection = self.collection(collection);

        let result = if multi {
            collection
                .update_many(filter, update)
                .session(&mut self.session)
                .await
        } else {
            collection
                .update_one(filter, update)
                .session(&mut self.session)
                .await
        }
        .map_err(|e| ModelError::StoreFailure(e.to_string()))?;

        Ok(result.matched_count)
    }

    async fn delete(&mut self, collection: &str, filter: &Cond, multi: bool) -> ModelResult<u64> {
        let filter = filter.to_document()?;
        let collection = self.collection(collection);

        let result = if multi {
            collection
                .delete_many(filter)
                .session(&mut self.session)
                .await
        } else {
            collection
                .delete_one(filter)
                .session(&mut self.session)
                .await
        }
        .map_err(|e| ModelError::StoreFailure(e.to_string()))?;

        Ok(result.deleted_count)
    }
}

/// Renders sort keys as a MongoDB sort specification.
fn sort_document(sort: &[Sort]) -> Document {
    sort.iter()
        .map(|key| {
            let direction = match key.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            (key.field.clone(), Bson::Int32(direction))
        })
        .collect()
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> ModelResult<Self::Backend> {
        let options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| ModelError::StoreFailure(e.to_string()))?;

        tracing::debug!(database = %self.database, "connecting to mongodb");

        Ok(MongoDbStore::new(
            Client::with_options(options).map_err(|e| ModelError::StoreFailure(e.to_string()))?,
            self.database,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmodel_core::query::Filter;
    use pretty_assertions::assert_eq;

    #[test]
    fn sort_keys_keep_their_order() {
        let sort = vec![Sort::desc("CreatedAt"), Sort::asc("name")];

        assert_eq!(sort_document(&sort), doc! { "CreatedAt": -1, "name": 1 });
    }

    #[test]
    fn filters_render_through_the_condition_tree() {
        let filter = Cond::from_document(&doc! { "age": { "$gte": 18 }, "$where": "sleep(1)" })
            .unwrap()
            .and(Filter::ne("IsDeleted", true));

        assert_eq!(
            filter.to_document().unwrap(),
            doc! { "age": { "$gte": 18 }, "IsDeleted": { "$ne": true } }
        );
    }
}
