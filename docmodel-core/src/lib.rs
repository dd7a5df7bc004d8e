//! A schema-driven document CRUD engine over pluggable document stores.
//!
//! This crate is the core of the docmodel project and provides:
//!
//! - **Schemas** ([`schema`]) - Declarative collection descriptions, relations and hooks
//! - **Model operations** ([`model`]) - Create, list, one, id, update, soft and physical remove
//! - **Lifecycle hooks** ([`scope`]) - Per-operation context and hook dispatch
//! - **Query parameters** ([`params`]) - Resolving loosely-typed input into strict params
//! - **Conditions** ([`query`]) - Condition trees, projections, sort keys and find queries
//! - **Identifiers** ([`identifier`]) - Rewriting identifier strings into native identifiers
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage backends
//! - **Model store** ([`store`]) - Entry point tying a backend to a schema registry
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//! use docmodel::memory::InMemoryStore;
//! use serde_json::json;
//!
//! let registry = SchemaRegistry::new([
//!     Schema::builder("Org", "orgs").field("name", FieldKind::String).build(),
//!     Schema::builder("User", "users")
//!         .field("name", FieldKind::String)
//!         .relation("org", "Org")
//!         .build(),
//! ])?;
//! let store = ModelStore::new(InMemoryStore::new(), registry);
//!
//! let users = store.model("User")?;
//! users.create(&doc! { "name": "Alice", "org": { "name": "Acme" } }).await?;
//!
//! let page = users.list(json!({ "cond": { "name": "Alice" } })).await?;
//! assert_eq!(page.total_records, 1);
//! ```

pub mod backend;
pub mod document;
pub mod error;
pub mod identifier;
mod join;
pub mod model;
pub mod page;
pub mod params;
pub mod query;
pub mod schema;
pub mod scope;
pub mod store;
