//! Per-operation context and lifecycle hook dispatch.
//!
//! Every model operation builds a fresh [`Scope`], fills in the snapshot for its
//! operation kind and dispatches hooks through it. Hooks receive the scope
//! mutably: they can stash values in [`Scope::cache`] for a later hook of the
//! same operation, or rewrite the snapshot the operation is about to persist.
//! A scope is dropped when its operation returns.

use bson::Document;
use std::fmt;

use crate::{
    error::{ModelError, ModelResult},
    page::ListResult,
    params::Params,
    query::Cond,
    schema::{Hooks, Schema},
};

/// Kind of model operation a scope belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    List,
    One,
    Id,
    Update,
    Remove,
    PhyRemove,
}

impl Operation {
    /// Returns `true` for operations that only read.
    pub fn is_read(&self) -> bool {
        matches!(self, Operation::List | Operation::One | Operation::Id)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "Create",
            Operation::List => "List",
            Operation::One => "One",
            Operation::Id => "ID",
            Operation::Update => "Update",
            Operation::Remove => "Remove",
            Operation::PhyRemove => "PhyRemove",
        };
        f.write_str(name)
    }
}

/// Lifecycle hook names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeSave,
    AfterSave,
    BeforeRemove,
    AfterRemove,
    BeforePhyRemove,
    AfterPhyRemove,
    BeforeFind,
    AfterFind,
}

impl Hook {
    pub const ALL: [Hook; 12] = [
        Hook::BeforeCreate,
        Hook::AfterCreate,
        Hook::BeforeUpdate,
        Hook::AfterUpdate,
        Hook::BeforeSave,
        Hook::AfterSave,
        Hook::BeforeRemove,
        Hook::AfterRemove,
        Hook::BeforePhyRemove,
        Hook::AfterPhyRemove,
        Hook::BeforeFind,
        Hook::AfterFind,
    ];
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Context of one model operation.
#[derive(Debug)]
pub struct Scope {
    operation: Operation,
    model: String,
    collection: String,
    /// Scratch space shared by the hooks of this operation.
    pub cache: Document,
    /// Resolved parameters of a read.
    pub params: Option<Params>,
    /// Documents being created; the persisted form after the insert.
    pub create_data: Vec<Document>,
    /// Envelope of a `list`, available to `AfterFind`.
    pub list_data: Option<ListResult>,
    /// Result of a `one`/`id`, available to `AfterFind`.
    pub one_data: Option<Document>,
    pub update_cond: Option<Cond>,
    /// Update operator document (`{"$set": {...}}`). Protected fields a hook
    /// puts back are dropped again before the write.
    pub update_doc: Option<Document>,
    pub update_all: bool,
    pub remove_cond: Option<Cond>,
    /// Update operator document of a soft remove; `None` for a physical remove.
    /// Protected fields a hook puts back are dropped again before the write.
    pub remove_doc: Option<Document>,
    pub remove_all: bool,
}

impl Scope {
    pub fn new(operation: Operation, schema: &Schema) -> Self {
        Scope {
            operation,
            model: schema.name().to_string(),
            collection: schema.collection().to_string(),
            cache: Document::new(),
            params: None,
            create_data: Vec::new(),
            list_data: None,
            one_data: None,
            update_cond: None,
            update_doc: None,
            update_all: false,
            remove_cond: None,
            remove_doc: None,
            remove_all: false,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Name of the model the operation runs against.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Calls the callback registered for `hook`, if any.
    ///
    /// # Errors
    ///
    /// Wraps a callback failure in [`ModelError::HookAborted`].
    pub fn dispatch(&mut self, hook: Hook, hooks: &Hooks) -> ModelResult<()> {
        let Some(callback) = hooks.get(hook) else {
            return Ok(());
        };

        tracing::debug!(
            model = %self.model,
            operation = %self.operation,
            %hook,
            "dispatching hook"
        );

        callback(self).map_err(|source| {
            tracing::warn!(
                model = %self.model,
                operation = %self.operation,
                %hook,
                error = %source,
                "hook aborted operation"
            );
            ModelError::HookAborted { hook, source }
        })
    }

    /// Dispatches several hooks in order, stopping at the first failure.
    pub fn dispatch_all(&mut self, sequence: &[Hook], hooks: &Hooks) -> ModelResult<()> {
        for hook in sequence {
            self.dispatch(*hook, hooks)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn missing_hooks_are_no_ops() {
        let schema = Schema::builder("User", "users").build();
        let mut scope = Scope::new(Operation::Create, &schema);

        assert!(scope.dispatch(Hook::BeforeCreate, schema.hooks()).is_ok());
    }

    #[test]
    fn hooks_share_the_cache() {
        let schema = Schema::builder("User", "users")
            .hook(Hook::BeforeSave, |scope| {
                scope.cache.insert("step", 1);
                Ok(())
            })
            .hook(Hook::AfterSave, |scope| {
                let step = scope.cache.get_i32("step")?;
                scope.cache.insert("step", step + 1);
                Ok(())
            })
            .build();

        let mut scope = Scope::new(Operation::Create, &schema);
        scope
            .dispatch_all(&[Hook::BeforeSave, Hook::AfterSave], schema.hooks())
            .unwrap();

        assert_eq!(scope.cache.get_i32("step").unwrap(), 2);
    }

    #[test]
    fn failures_stop_the_sequence() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let first = calls.clone();
        let second = calls.clone();

        let schema = Schema::builder("User", "users")
            .hook(Hook::BeforeSave, move |_| {
                first.lock().unwrap().push(Hook::BeforeSave);
                Err("denied".into())
            })
            .hook(Hook::BeforeCreate, move |_| {
                second.lock().unwrap().push(Hook::BeforeCreate);
                Ok(())
            })
            .build();

        let mut scope = Scope::new(Operation::Create, &schema);
        let err = scope
            .dispatch_all(&[Hook::BeforeSave, Hook::BeforeCreate], schema.hooks())
            .unwrap_err();

        assert!(matches!(err, ModelError::HookAborted { hook: Hook::BeforeSave, .. }));
        assert_eq!(*calls.lock().unwrap(), vec![Hook::BeforeSave]);
    }
}
