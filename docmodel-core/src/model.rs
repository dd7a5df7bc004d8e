//! The model façade: CRUD operations over one schema's collection.
//!
//! Every operation runs the same pipeline: build a [`Scope`], acquire a store
//! session, dispatch the `Before*` hooks, normalize identifiers and resolve
//! relations, talk to the store, dispatch the `After*` hooks. The session and
//! the scope are dropped when the operation returns, on success or failure.
//!
//! # Hook order
//!
//! | Operation | Sequence |
//! |---|---|
//! | `create` | `BeforeSave`, `BeforeCreate`, joins, insert, `AfterCreate`, `AfterSave` |
//! | `update*` | `BeforeSave`, `BeforeUpdate`, joins, update, `AfterUpdate`, `AfterSave` |
//! | `remove*` | `BeforeRemove`, joins, update, `AfterRemove` |
//! | `phy_remove*` | `BeforePhyRemove`, delete, `AfterPhyRemove` |
//! | `list`, `one`, `id` | `BeforeFind`, count (`list` only), find, join, `AfterFind` |
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//! use serde_json::json;
//!
//! let users = store.model("User")?;
//!
//! let created = users.create(&doc! { "name": "Alice", "CreatedBy": actor_hex }).await?;
//! let id = created[0].get_object_id("_id")?;
//!
//! users.update(&doc! { "_id": id }, &doc! { "age": 31 }).await?;
//!
//! let page = users.list(json!({ "page": 1, "size": 10, "sort": "-CreatedAt" })).await?;
//! let alice = users.id(id).await?;
//!
//! users.remove(&doc! { "_id": id }).await?;
//! ```

use bson::{Bson, Document, doc, oid::ObjectId};
use chrono::Local;
use serde::Serialize;
use std::{fmt::Write, sync::Arc};

use crate::{
    backend::{StoreBackend, StoreSession},
    document::{
        CREATED_AT, CREATED_AT_FMT, CREATED_BY, ID, IS_DELETED, PROTECTED_FIELDS, UPDATED_AT,
        UPDATED_AT_FMT, UPDATED_BY, to_document, to_documents,
    },
    error::{ModelError, ModelResult},
    identifier::{normalize_condition, normalize_identifier, parse_identifier},
    join,
    page::ListResult,
    params::{IntoIdParams, IntoParams, Params, Range},
    query::{Cond, Filter, FindQuery},
    schema::{Schema, SchemaRegistry},
    scope::{Hook, Operation, Scope},
    store::StoreOptions,
};

const SET: &str = "$set";

/// Operations over the collection of one schema.
///
/// Obtained from [`ModelStore::model`](crate::store::ModelStore::model).
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the store the model was taken from
/// * `B` - The storage backend type
#[derive(Debug)]
pub struct Model<'a, B: StoreBackend> {
    schema: Arc<Schema>,
    backend: &'a B,
    registry: &'a SchemaRegistry,
    options: &'a StoreOptions,
}

impl<B: StoreBackend> Clone for Model<'_, B> {
    fn clone(&self) -> Self {
        Model {
            schema: self.schema.clone(),
            backend: self.backend,
            registry: self.registry,
            options: self.options,
        }
    }
}

impl<'a, B: StoreBackend> Model<'a, B> {
    pub(crate) fn new(
        schema: Arc<Schema>,
        backend: &'a B,
        registry: &'a SchemaRegistry,
        options: &'a StoreOptions,
    ) -> Self {
        Self {
            schema,
            backend,
            registry,
            options,
        }
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn collection(&self) -> &str {
        self.schema.collection()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The model of another registered schema, sharing this model's store.
    pub(crate) fn related(&self, name: &str) -> ModelResult<Model<'a, B>> {
        Ok(Model::new(
            self.registry.get(name)?,
            self.backend,
            self.registry,
            self.options,
        ))
    }

    fn scope(&self, operation: Operation) -> Scope {
        Scope::new(operation, &self.schema)
    }

    fn dispatch(&self, scope: &mut Scope, hooks: &[Hook]) -> ModelResult<()> {
        scope.dispatch_all(hooks, self.schema.hooks())
    }

    /// Creates one document, or one per element when `data` serializes to an array.
    ///
    /// Each document gets an `_id` (unless it brings one), the creation audit
    /// fields and identical update audit fields. Nested documents under relation
    /// fields are created first and replaced by their identifiers.
    ///
    /// Returns the documents as persisted.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidDocument`] if `data` is not a document or an array
    /// of documents, [`ModelError::MalformedIdentifier`] for unparsable identifiers,
    /// [`ModelError::HookAborted`] if a hook fails, and [`ModelError::StoreFailure`]
    /// if the insert fails.
    pub async fn create<T: Serialize + ?Sized>(&self, data: &T) -> ModelResult<Vec<Document>> {
        let documents = to_documents(data)?;
        let mut session = self.backend.acquire().await?;

        self.create_in(&mut session, documents).await
    }

    /// Runs the create pipeline on an already acquired session.
    pub(crate) async fn create_in(
        &self,
        session: &mut B::Session,
        documents: Vec<Document>,
    ) -> ModelResult<Vec<Document>> {
        let stamp = Stamp::now(&self.options.time_format)?;

        let mut scope = self.scope(Operation::Create);
        scope.create_data = documents
            .into_iter()
            .map(|document| stamp_created(document, &stamp))
            .collect::<ModelResult<_>>()?;

        self.dispatch(&mut scope, &[Hook::BeforeSave, Hook::BeforeCreate])?;

        let mut documents = std::mem::take(&mut scope.create_data);
        for document in documents.iter_mut() {
            if !document.contains_key(ID) {
                document.insert(ID, ObjectId::new());
            }
            let actor = document.get(CREATED_BY).cloned();
            join::resolve_before_save(self, session, document, actor).await?;
        }

        tracing::debug!(
            model = %self.name(),
            collection = %self.collection(),
            operation = %Operation::Create,
            count = documents.len(),
            "inserting documents"
        );
        session.insert(self.collection(), documents.clone()).await?;

        scope.create_data = documents;
        self.dispatch(&mut scope, &[Hook::AfterCreate, Hook::AfterSave])?;

        Ok(scope.create_data)
    }

    /// Lists documents matching the params' condition.
    ///
    /// Soft-deleted documents are left out unless the condition constrains
    /// `IsDeleted` itself. In [`Range::Page`] mode only the requested page is
    /// fetched; the total count always covers every match.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParams`]/[`ModelError::InvalidCondition`] for
    /// malformed params, [`ModelError::MalformedIdentifier`] for unparsable
    /// identifiers, [`ModelError::HookAborted`] and [`ModelError::StoreFailure`].
    pub async fn list<P: IntoParams>(&self, params: P) -> ModelResult<ListResult> {
        let mut params = params.into_params(self.options)?;
        params.cond = self.normalize(std::mem::take(&mut params.cond))?;
        if !params.cond.constrains(IS_DELETED) {
            params.cond = std::mem::take(&mut params.cond).and(Filter::ne(IS_DELETED, true));
        }

        let mut session = self.backend.acquire().await?;
        let mut scope = self.scope(Operation::List);
        scope.params = Some(params);
        self.dispatch(&mut scope, &[Hook::BeforeFind])?;
        let params = scope.params.take().unwrap_or_default();

        tracing::debug!(
            model = %self.name(),
            collection = %self.collection(),
            operation = %Operation::List,
            range = %params.range,
            "listing documents"
        );

        let total = session.count(self.collection(), &params.cond).await?;

        let mut query = FindQuery::builder()
            .filter(params.cond.clone())
            .projection(params.project.clone())
            .sorts(params.sort.clone());
        if params.range == Range::Page {
            query = query.skip(params.offset()).limit(params.size);
        }
        let mut list = session.find(self.collection(), query.build()).await?;
        join::join_documents(self, &mut session, &mut list, params.project.as_ref()).await?;

        scope.list_data = Some(ListResult::new(list, total, &params));
        scope.params = Some(params);
        self.dispatch(&mut scope, &[Hook::AfterFind])?;

        Ok(scope.list_data.take().unwrap_or_default())
    }

    /// Returns the first document matching the params' condition, honouring
    /// sort and projection.
    ///
    /// No soft-delete filter is implied. Returns `None` when nothing matches.
    pub async fn one<P: IntoParams>(&self, params: P) -> ModelResult<Option<Document>> {
        let mut params = params.into_params(self.options)?;
        params.cond = self.normalize(std::mem::take(&mut params.cond))?;

        self.find_one(Operation::One, params).await
    }

    /// Looks a document up by primary identifier.
    ///
    /// Accepts an identifier string, an [`ObjectId`], or params carrying `id`.
    /// Returns `None` when no document has that identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::RequiredFieldMissing`] if no identifier was given
    /// and [`ModelError::MalformedIdentifier`] if it does not parse.
    pub async fn id<I: IntoIdParams>(&self, id: I) -> ModelResult<Option<Document>> {
        let mut params = id.into_id_params()?;
        let id = match params.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => parse_identifier(id)?,
            _ => return Err(ModelError::RequiredFieldMissing("id".to_string())),
        };
        params.cond = Filter::eq(ID, id);

        self.find_one(Operation::Id, params).await
    }

    async fn find_one(
        &self,
        operation: Operation,
        params: Params,
    ) -> ModelResult<Option<Document>> {
        let mut session = self.backend.acquire().await?;
        let mut scope = self.scope(operation);
        scope.params = Some(params);
        self.dispatch(&mut scope, &[Hook::BeforeFind])?;
        let params = scope.params.take().unwrap_or_default();

        tracing::debug!(
            model = %self.name(),
            collection = %self.collection(),
            operation = %operation,
            "finding document"
        );

        let query = FindQuery::builder()
            .filter(params.cond.clone())
            .projection(params.project.clone())
            .sorts(params.sort.clone())
            .build();
        let mut found = session.find_one(self.collection(), query).await?;
        if let Some(document) = found.as_mut() {
            join::join_documents(
                self,
                &mut session,
                std::slice::from_mut(document),
                params.project.as_ref(),
            )
            .await?;
        }

        scope.one_data = found;
        scope.params = Some(params);
        self.dispatch(&mut scope, &[Hook::AfterFind])?;

        Ok(scope.one_data.take())
    }

    /// Updates the first document matching `selector`.
    ///
    /// # Arguments
    ///
    /// * `selector` - Condition in document form (or a [`Cond`])
    /// * `data` - Fields to set, or an update operator document (`$set`, `$unset`, `$inc`)
    ///
    /// `_id` and the creation audit fields are never written; `UpdatedAt` and
    /// `UpdatedAtFmt` are stamped. Returns the number of matched documents.
    pub async fn update<C, T>(&self, selector: &C, data: &T) -> ModelResult<u64>
    where
        C: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        self.run_update(selector_cond(selector)?, to_document(data)?, false)
            .await
    }

    /// Updates the document identified by the entity's `_id` with the rest of
    /// its fields.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::RequiredFieldMissing`] before touching the store if
    /// the entity has no `_id`.
    pub async fn update_entity<T: Serialize + ?Sized>(&self, entity: &T) -> ModelResult<u64> {
        let mut document = to_document(entity)?;
        let id = entity_id(&document)?;
        document.remove(ID);

        self.run_update(Filter::eq(ID, id), document, false).await
    }

    /// Updates every document matching `selector`.
    pub async fn update_all<C, T>(&self, selector: &C, data: &T) -> ModelResult<u64>
    where
        C: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        self.run_update(selector_cond(selector)?, to_document(data)?, true)
            .await
    }

    async fn run_update(&self, cond: Cond, data: Document, multi: bool) -> ModelResult<u64> {
        let cond = self.normalize(cond)?;
        let update = prepare_update(data, &Stamp::now(&self.options.time_format)?, false)?;

        let mut session = self.backend.acquire().await?;
        let mut scope = self.scope(Operation::Update);
        scope.update_cond = Some(cond);
        scope.update_doc = Some(update);
        scope.update_all = multi;
        self.dispatch(&mut scope, &[Hook::BeforeSave, Hook::BeforeUpdate])?;

        let cond = scope.update_cond.take().unwrap_or_default();
        let mut update = scope.update_doc.take().unwrap_or_default();
        strip_protected(&mut update);
        self.resolve_update_joins(&mut session, &mut update).await?;

        tracing::debug!(
            model = %self.name(),
            collection = %self.collection(),
            operation = %Operation::Update,
            multi,
            "updating documents"
        );
        let matched = session
            .update(self.collection(), &cond, update.clone(), scope.update_all)
            .await?;

        scope.update_cond = Some(cond);
        scope.update_doc = Some(update);
        self.dispatch(&mut scope, &[Hook::AfterUpdate, Hook::AfterSave])?;

        Ok(matched)
    }

    /// Soft-removes the first document matching `selector`.
    ///
    /// The document stays in the store with `IsDeleted` set and disappears from
    /// `list`. Returns the number of matched documents.
    pub async fn remove<C: Serialize + ?Sized>(&self, selector: &C) -> ModelResult<u64> {
        self.run_remove(selector_cond(selector)?, Document::new(), false)
            .await
    }

    /// Soft-removes the first document matching `selector`, setting the extra
    /// fields in `data` at the same time.
    pub async fn remove_with_data<C, T>(&self, selector: &C, data: &T) -> ModelResult<u64>
    where
        C: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        self.run_remove(selector_cond(selector)?, to_document(data)?, false)
            .await
    }

    /// Soft-removes the document identified by the entity's `_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::RequiredFieldMissing`] before touching the store if
    /// the entity has no `_id`.
    pub async fn remove_entity<T: Serialize + ?Sized>(&self, entity: &T) -> ModelResult<u64> {
        let id = entity_id(&to_document(entity)?)?;

        self.run_remove(Filter::eq(ID, id), Document::new(), false)
            .await
    }

    /// Soft-removes the document identified by the entity's `_id`, setting the
    /// extra fields in `data` at the same time.
    pub async fn remove_entity_with_data<E, T>(&self, entity: &E, data: &T) -> ModelResult<u64>
    where
        E: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        let id = entity_id(&to_document(entity)?)?;

        self.run_remove(Filter::eq(ID, id), to_document(data)?, false)
            .await
    }

    /// Soft-removes every document matching `selector`.
    pub async fn remove_all<C: Serialize + ?Sized>(&self, selector: &C) -> ModelResult<u64> {
        self.run_remove(selector_cond(selector)?, Document::new(), true)
            .await
    }

    /// Soft-removes every document matching `selector`, setting the extra fields
    /// in `data` on each of them.
    pub async fn remove_all_with_data<C, T>(&self, selector: &C, data: &T) -> ModelResult<u64>
    where
        C: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        self.run_remove(selector_cond(selector)?, to_document(data)?, true)
            .await
    }

    async fn run_remove(&self, cond: Cond, data: Document, multi: bool) -> ModelResult<u64> {
        let cond = self.normalize(cond)?;
        let update = prepare_update(data, &Stamp::now(&self.options.time_format)?, true)?;

        let mut session = self.backend.acquire().await?;
        let mut scope = self.scope(Operation::Remove);
        scope.remove_cond = Some(cond);
        scope.remove_doc = Some(update);
        scope.remove_all = multi;
        self.dispatch(&mut scope, &[Hook::BeforeRemove])?;

        let cond = scope.remove_cond.take().unwrap_or_default();
        let mut update = scope.remove_doc.take().unwrap_or_default();
        strip_protected(&mut update);
        self.resolve_update_joins(&mut session, &mut update).await?;

        tracing::debug!(
            model = %self.name(),
            collection = %self.collection(),
            operation = %Operation::Remove,
            multi,
            "soft-removing documents"
        );
        let matched = session
            .update(self.collection(), &cond, update.clone(), scope.remove_all)
            .await?;

        scope.remove_cond = Some(cond);
        scope.remove_doc = Some(update);
        self.dispatch(&mut scope, &[Hook::AfterRemove])?;

        Ok(matched)
    }

    /// Permanently deletes the first document matching `selector`.
    ///
    /// Returns the number of deleted documents; deleting nothing is not an error.
    pub async fn phy_remove<C: Serialize + ?Sized>(&self, selector: &C) -> ModelResult<u64> {
        self.run_phy_remove(selector_cond(selector)?, false).await
    }

    /// Permanently deletes the document identified by the entity's `_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::RequiredFieldMissing`] before touching the store if
    /// the entity has no `_id`.
    pub async fn phy_remove_entity<T: Serialize + ?Sized>(&self, entity: &T) -> ModelResult<u64> {
        let id = entity_id(&to_document(entity)?)?;

        self.run_phy_remove(Filter::eq(ID, id), false).await
    }

    /// Permanently deletes every document matching `selector`.
    pub async fn phy_remove_all<C: Serialize + ?Sized>(&self, selector: &C) -> ModelResult<u64> {
        self.run_phy_remove(selector_cond(selector)?, true).await
    }

    async fn run_phy_remove(&self, cond: Cond, multi: bool) -> ModelResult<u64> {
        let cond = self.normalize(cond)?;

        let mut session = self.backend.acquire().await?;
        let mut scope = self.scope(Operation::PhyRemove);
        scope.remove_cond = Some(cond);
        scope.remove_all = multi;
        self.dispatch(&mut scope, &[Hook::BeforePhyRemove])?;

        let cond = scope.remove_cond.take().unwrap_or_default();

        tracing::debug!(
            model = %self.name(),
            collection = %self.collection(),
            operation = %Operation::PhyRemove,
            multi,
            "deleting documents"
        );
        let deleted = session
            .delete(self.collection(), &cond, scope.remove_all)
            .await?;

        scope.remove_cond = Some(cond);
        self.dispatch(&mut scope, &[Hook::AfterPhyRemove])?;

        Ok(deleted)
    }

    fn normalize(&self, cond: Cond) -> ModelResult<Cond> {
        normalize_condition(cond, &self.schema.identifier_fields())
    }

    async fn resolve_update_joins(
        &self,
        session: &mut B::Session,
        update: &mut Document,
    ) -> ModelResult<()> {
        if let Some(Bson::Document(set)) = update.get_mut(SET) {
            let actor = set.get(UPDATED_BY).cloned();
            join::resolve_before_save(self, session, set, actor).await?;
        }

        Ok(())
    }
}

/// The instant an operation stamps on the documents it writes.
struct Stamp {
    at: i64,
    formatted: String,
}

impl Stamp {
    fn now(format: &str) -> ModelResult<Self> {
        let now = Local::now();

        let mut formatted = String::new();
        write!(formatted, "{}", now.format(format))
            .map_err(|_| ModelError::Serialization(format!("invalid time format {format:?}")))?;

        Ok(Stamp {
            at: now.timestamp(),
            formatted,
        })
    }
}

fn selector_cond<C: Serialize + ?Sized>(selector: &C) -> ModelResult<Cond> {
    Cond::from_document(&to_document(selector)?)
}

fn entity_id(entity: &Document) -> ModelResult<Bson> {
    match entity.get(ID) {
        None | Some(Bson::Null) => Err(ModelError::RequiredFieldMissing(ID.to_string())),
        Some(id) => normalize_identifier(id.clone()),
    }
}

fn normalize_actor(document: &mut Document, field: &str) -> ModelResult<Option<Bson>> {
    match document.remove(field) {
        None | Some(Bson::Null) => Ok(None),
        Some(actor) => {
            let actor = normalize_identifier(actor)?;
            document.insert(field, actor.clone());
            Ok(Some(actor))
        }
    }
}

/// Puts `_id` first and stamps the creation audit fields, mirrored into the
/// update audit fields.
fn stamp_created(mut document: Document, stamp: &Stamp) -> ModelResult<Document> {
    let id = match document.remove(ID) {
        None | Some(Bson::Null) => Bson::ObjectId(ObjectId::new()),
        Some(id) => normalize_identifier(id)?,
    };

    let mut stamped = doc! { ID: id };
    for (key, value) in document {
        stamped.insert(key, value);
    }

    stamped.remove(UPDATED_BY);
    let actor = normalize_actor(&mut stamped, CREATED_BY)?;

    stamped.insert(CREATED_AT, stamp.at);
    stamped.insert(CREATED_AT_FMT, stamp.formatted.clone());
    stamped.insert(UPDATED_AT, stamp.at);
    stamped.insert(UPDATED_AT_FMT, stamp.formatted.clone());
    if let Some(actor) = actor {
        stamped.insert(UPDATED_BY, actor);
    }

    Ok(stamped)
}

/// Turns caller data into an update operator document.
///
/// Plain fields are collected under `$set` next to any `$set` the caller wrote;
/// other operators pass through. Protected fields are dropped from every
/// operator.
fn prepare_update(data: Document, stamp: &Stamp, remove: bool) -> ModelResult<Document> {
    let mut update = Document::new();
    let mut set = Document::new();

    for (key, value) in data {
        if !key.starts_with('$') {
            set.insert(key, value);
            continue;
        }

        let Bson::Document(fields) = value else {
            return Err(ModelError::InvalidDocument(format!("{key} must be a document")));
        };
        if key == SET {
            for (field, value) in fields {
                set.insert(field, value);
            }
            continue;
        }

        update.insert(key, fields);
    }

    if remove {
        set.insert(IS_DELETED, true);
    }
    set.insert(UPDATED_AT, stamp.at);
    set.insert(UPDATED_AT_FMT, stamp.formatted.clone());
    normalize_actor(&mut set, UPDATED_BY)?;

    update.insert(SET, set);
    strip_protected(&mut update);

    Ok(update)
}

/// Drops protected fields from every operator of an update document, and
/// operators other than `$set` left empty by that.
fn strip_protected(update: &mut Document) {
    let mut emptied = Vec::new();

    for (operator, fields) in update.iter_mut() {
        let Bson::Document(fields) = fields else {
            continue;
        };
        for field in PROTECTED_FIELDS {
            fields.remove(field);
        }
        if fields.is_empty() && operator != SET {
            emptied.push(operator.clone());
        }
    }

    for operator in emptied {
        update.remove(&operator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stamp() -> Stamp {
        Stamp {
            at: 1_700_000_000,
            formatted: "2023-11-14 22:13:20".to_string(),
        }
    }

    #[test]
    fn created_audit_fields_are_mirrored() {
        let actor = ObjectId::new();
        let created =
            stamp_created(doc! { "name": "x", "CreatedBy": actor.to_hex() }, &stamp()).unwrap();

        assert!(created.get_object_id(ID).is_ok());
        assert_eq!(created.keys().next().map(String::as_str), Some(ID));
        assert_eq!(created.get(CREATED_AT), created.get(UPDATED_AT));
        assert_eq!(created.get(CREATED_AT_FMT), created.get(UPDATED_AT_FMT));
        assert_eq!(created.get_object_id(CREATED_BY).unwrap(), actor);
        assert_eq!(created.get_object_id(UPDATED_BY).unwrap(), actor);
    }

    #[test]
    fn supplied_identifiers_are_normalized() {
        let id = ObjectId::new();
        let created = stamp_created(doc! { "_id": id.to_hex() }, &stamp()).unwrap();
        assert_eq!(created.get_object_id(ID).unwrap(), id);

        assert!(matches!(
            stamp_created(doc! { "_id": "nope" }, &stamp()),
            Err(ModelError::MalformedIdentifier(_))
        ));
    }

    #[test]
    fn updates_wrap_plain_fields_and_strip_protected_ones() {
        let update = prepare_update(
            doc! {
                "_id": ObjectId::new(),
                "CreatedAt": 1,
                "CreatedBy": "someone",
                "name": "y",
                "$inc": { "visits": 1, "CreatedAt": 5 },
            },
            &stamp(),
            false,
        )
        .unwrap();

        assert_eq!(
            update,
            doc! {
                "$inc": { "visits": 1 },
                "$set": {
                    "name": "y",
                    "UpdatedAt": 1_700_000_000i64,
                    "UpdatedAtFmt": "2023-11-14 22:13:20",
                },
            }
        );
    }

    #[test]
    fn protected_fields_are_dropped_from_every_operator() {
        let mut update = doc! {
            "$unset": { "CreatedAt": "" },
            "$set": { "_id": ObjectId::new(), "CreatedBy": "x", "name": "y" },
        };
        strip_protected(&mut update);

        assert_eq!(update, doc! { "$set": { "name": "y" } });
    }

    #[test]
    fn removals_flag_the_document() {
        let actor = ObjectId::new();
        let update = prepare_update(
            doc! { "$set": { "reason": "spam" }, "UpdatedBy": actor.to_hex() },
            &stamp(),
            true,
        )
        .unwrap();

        let set = update.get_document(SET).unwrap();
        assert!(set.get_bool(IS_DELETED).unwrap());
        assert_eq!(set.get_str("reason").unwrap(), "spam");
        assert_eq!(set.get_object_id(UPDATED_BY).unwrap(), actor);
    }

    #[test]
    fn entities_need_an_identifier() {
        assert!(matches!(
            entity_id(&doc! { "name": "x" }),
            Err(ModelError::RequiredFieldMissing(field)) if field == "_id"
        ));
        assert!(matches!(
            entity_id(&doc! { "_id": null }),
            Err(ModelError::RequiredFieldMissing(_))
        ));
    }

    #[test]
    fn rejects_invalid_time_formats() {
        assert!(Stamp::now("%Y-%m-%d").is_ok());
        assert!(matches!(Stamp::now("%Q"), Err(ModelError::Serialization(_))));
    }
}
