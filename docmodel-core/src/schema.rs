//! Declarative collection schemas and the registry that resolves relations between them.
//!
//! A [`Schema`] names a model, the collection it lives in, its fields (some of
//! which reference other models), and the lifecycle hooks it wants called.
//!
//! ```ignore
//! use docmodel::schema::{Schema, FieldKind, SchemaRegistry};
//! use docmodel::scope::Hook;
//!
//! let org = Schema::builder("Org", "orgs")
//!     .field("name", FieldKind::String)
//!     .build();
//!
//! let user = Schema::builder("User", "users")
//!     .field("name", FieldKind::String)
//!     .relation("org", "Org")
//!     .hook(Hook::BeforeCreate, |scope| {
//!         scope.cache.insert("seen", true);
//!         Ok(())
//!     })
//!     .build();
//!
//! let registry = SchemaRegistry::new([org, user])?;
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use crate::{
    document::ID,
    error::{BoxError, ModelError, ModelResult},
    scope::{Hook, Scope},
};

/// Result returned by hook callbacks.
pub type HookResult = Result<(), BoxError>;

/// A hook callback.
pub type HookFn = Arc<dyn Fn(&mut Scope) -> HookResult + Send + Sync>;

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    ObjectId,
    Document,
    Array,
    Any,
}

/// How many documents a relation field references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// The field holds one foreign key.
    One,
    /// The field holds an array of foreign keys.
    Many,
}

/// A reference from a field to documents of another model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Name of the referenced schema.
    pub target: String,
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    /// Declared value kind. Descriptive only: stored values are not checked
    /// against it.
    pub kind: FieldKind,
    pub relation: Option<Relation>,
}

/// Optional lifecycle callbacks, one per [`Hook`].
#[derive(Clone, Default)]
pub struct Hooks {
    pub before_create: Option<HookFn>,
    pub after_create: Option<HookFn>,
    pub before_update: Option<HookFn>,
    pub after_update: Option<HookFn>,
    pub before_save: Option<HookFn>,
    pub after_save: Option<HookFn>,
    pub before_remove: Option<HookFn>,
    pub after_remove: Option<HookFn>,
    pub before_phy_remove: Option<HookFn>,
    pub after_phy_remove: Option<HookFn>,
    pub before_find: Option<HookFn>,
    pub after_find: Option<HookFn>,
}

impl Hooks {
    fn slot(&mut self, hook: Hook) -> &mut Option<HookFn> {
        match hook {
            Hook::BeforeCreate => &mut self.before_create,
            Hook::AfterCreate => &mut self.after_create,
            Hook::BeforeUpdate => &mut self.before_update,
            Hook::AfterUpdate => &mut self.after_update,
            Hook::BeforeSave => &mut self.before_save,
            Hook::AfterSave => &mut self.after_save,
            Hook::BeforeRemove => &mut self.before_remove,
            Hook::AfterRemove => &mut self.after_remove,
            Hook::BeforePhyRemove => &mut self.before_phy_remove,
            Hook::AfterPhyRemove => &mut self.after_phy_remove,
            Hook::BeforeFind => &mut self.before_find,
            Hook::AfterFind => &mut self.after_find,
        }
    }

    /// Returns the callback registered for a hook, if any.
    pub fn get(&self, hook: Hook) -> Option<&HookFn> {
        match hook {
            Hook::BeforeCreate => self.before_create.as_ref(),
            Hook::AfterCreate => self.after_create.as_ref(),
            Hook::BeforeUpdate => self.before_update.as_ref(),
            Hook::AfterUpdate => self.after_update.as_ref(),
            Hook::BeforeSave => self.before_save.as_ref(),
            Hook::AfterSave => self.after_save.as_ref(),
            Hook::BeforeRemove => self.before_remove.as_ref(),
            Hook::AfterRemove => self.after_remove.as_ref(),
            Hook::BeforePhyRemove => self.before_phy_remove.as_ref(),
            Hook::AfterPhyRemove => self.after_phy_remove.as_ref(),
            Hook::BeforeFind => self.before_find.as_ref(),
            Hook::AfterFind => self.after_find.as_ref(),
        }
    }

    pub fn set<F>(&mut self, hook: Hook, callback: F)
    where
        F: Fn(&mut Scope) -> HookResult + Send + Sync + 'static,
    {
        *self.slot(hook) = Some(Arc::new(callback));
    }

    /// Hooks that have a callback.
    pub fn registered(&self) -> Vec<Hook> {
        Hook::ALL
            .into_iter()
            .filter(|hook| self.get(*hook).is_some())
            .collect()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.registered()).finish()
    }
}

/// Static description of a document collection.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    collection: String,
    fields: Vec<Field>,
    hooks: Hooks,
}

impl Schema {
    pub fn builder(name: impl Into<String>, collection: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name, collection)
    }

    /// Logical model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Fields declared as relations, with their relation.
    pub fn relations(&self) -> impl Iterator<Item = (&str, &Relation)> {
        self.fields
            .iter()
            .filter_map(|field| {
                field
                    .relation
                    .as_ref()
                    .map(|relation| (field.name.as_str(), relation))
            })
    }

    /// Fields whose values are native identifiers: `_id` and every relation field.
    pub fn identifier_fields(&self) -> Vec<&str> {
        std::iter::once(ID)
            .chain(self.relations().map(|(field, _)| field))
            .collect()
    }
}

/// Builder for [`Schema`].
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>, collection: impl Into<String>) -> Self {
        SchemaBuilder {
            schema: Schema {
                name: name.into(),
                collection: collection.into(),
                fields: Vec::new(),
                hooks: Hooks::default(),
            },
        }
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.schema.fields.push(Field { name: name.into(), kind, relation: None });
        self
    }

    /// Declares a field referencing one document of the `target` schema.
    pub fn relation(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.with_relation(name.into(), target.into(), Cardinality::One)
    }

    /// Declares a field referencing an array of documents of the `target` schema.
    pub fn relation_many(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.with_relation(name.into(), target.into(), Cardinality::Many)
    }

    fn with_relation(mut self, name: String, target: String, cardinality: Cardinality) -> Self {
        let kind = match cardinality {
            Cardinality::One => FieldKind::ObjectId,
            Cardinality::Many => FieldKind::Array,
        };
        self.schema.fields.push(Field {
            name,
            kind,
            relation: Some(Relation { target, cardinality }),
        });
        self
    }

    /// Registers a lifecycle callback.
    pub fn hook<F>(mut self, hook: Hook, callback: F) -> Self
    where
        F: Fn(&mut Scope) -> HookResult + Send + Sync + 'static,
    {
        self.schema.hooks.set(hook, callback);
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

/// The set of schemas a store serves, validated as a whole.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    /// Registers the schemas and validates their relations.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidSchema`] for duplicate names, relations to
    /// unregistered schemas, and relation cycles (a schema reaching itself,
    /// directly or through other schemas).
    pub fn new(schemas: impl IntoIterator<Item = Schema>) -> ModelResult<Self> {
        let mut registry = SchemaRegistry::default();

        for schema in schemas {
            let name = schema.name().to_string();
            if registry.schemas.insert(name.clone(), Arc::new(schema)).is_some() {
                return Err(ModelError::InvalidSchema(format!("duplicate schema {name}")));
            }
        }

        registry.validate()?;

        Ok(registry)
    }

    pub fn get(&self, name: &str) -> ModelResult<Arc<Schema>> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| ModelError::SchemaNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    fn validate(&self) -> ModelResult<()> {
        for schema in self.schemas.values() {
            for (field, relation) in schema.relations() {
                if !self.schemas.contains_key(&relation.target) {
                    return Err(ModelError::InvalidSchema(format!(
                        "{}.{field} references unknown schema {}",
                        schema.name(),
                        relation.target
                    )));
                }
            }
        }

        let mut done = HashSet::new();
        for name in self.schemas.keys() {
            self.visit(name, &mut Vec::new(), &mut done)?;
        }

        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        path: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> ModelResult<()> {
        if done.contains(name) {
            return Ok(());
        }
        if path.contains(&name) {
            path.push(name);
            return Err(ModelError::InvalidSchema(format!(
                "relation cycle {}",
                path.join(" -> ")
            )));
        }

        path.push(name);
        if let Some(schema) = self.schemas.get(name) {
            for (_, relation) in schema.relations() {
                self.visit(&relation.target, path, done)?;
            }
        }
        path.pop();
        done.insert(name);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_fields_include_relations() {
        let schema = Schema::builder("User", "users")
            .field("name", FieldKind::String)
            .relation("org", "Org")
            .relation_many("groups", "Group")
            .build();

        assert_eq!(schema.identifier_fields(), vec!["_id", "org", "groups"]);

        let kinds: Vec<FieldKind> = schema.fields().iter().map(|field| field.kind).collect();
        assert_eq!(kinds, vec![FieldKind::String, FieldKind::ObjectId, FieldKind::Array]);
    }

    #[test]
    fn hooks_are_optional() {
        let schema = Schema::builder("User", "users")
            .hook(Hook::AfterFind, |_| Ok(()))
            .build();

        assert!(schema.hooks().get(Hook::AfterFind).is_some());
        assert!(schema.hooks().get(Hook::BeforeFind).is_none());
        assert_eq!(schema.hooks().registered(), vec![Hook::AfterFind]);
    }

    #[test]
    fn rejects_unknown_targets() {
        let result =
            SchemaRegistry::new([Schema::builder("User", "users").relation("org", "Org").build()]);
        assert!(matches!(result, Err(ModelError::InvalidSchema(_))));
    }

    #[test]
    fn rejects_cycles() {
        let result = SchemaRegistry::new([
            Schema::builder("A", "a").relation("b", "B").build(),
            Schema::builder("B", "b").relation("a", "A").build(),
        ]);
        assert!(matches!(
            result,
            Err(ModelError::InvalidSchema(message)) if message.contains("cycle")
        ));

        let result = SchemaRegistry::new([Schema::builder("Node", "nodes")
            .relation("parent", "Node")
            .build()]);
        assert!(matches!(result, Err(ModelError::InvalidSchema(_))));
    }

    #[test]
    fn accepts_shared_targets() {
        let registry = SchemaRegistry::new([
            Schema::builder("Org", "orgs").build(),
            Schema::builder("User", "users").relation("org", "Org").build(),
            Schema::builder("Team", "teams")
                .relation("org", "Org")
                .relation_many("members", "User")
                .build(),
        ])
        .unwrap();

        let mut names: Vec<&str> = registry.names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["Org", "Team", "User"]);
        assert_eq!(registry.get("Team").unwrap().collection(), "teams");
        assert!(matches!(registry.get("Nope"), Err(ModelError::SchemaNotFound(_))));
    }

    #[test]
    fn rejects_duplicates() {
        let result = SchemaRegistry::new([
            Schema::builder("Org", "orgs").build(),
            Schema::builder("Org", "organizations").build(),
        ]);
        assert!(matches!(result, Err(ModelError::InvalidSchema(_))));
    }
}
