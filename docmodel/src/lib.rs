//! Main docmodel crate providing a unified interface over the model engine.
//!
//! This crate is the primary entry point for users of docmodel. It re-exports
//! the core types from the sub-crates and gives access to the storage backends.
//!
//! # Features
//!
//! - **Schema-driven models** - Register collections, relations and lifecycle hooks once
//! - **Audit bookkeeping** - Creation and update stamps are maintained on every write
//! - **Soft deletes** - `remove` flags documents; `phy_remove` erases them
//! - **Joins** - Nested documents are written before their parent and inlined again on read
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SchemaRegistry::new([
//!         Schema::builder("Org", "orgs").field("name", FieldKind::String).build(),
//!         Schema::builder("User", "users")
//!             .field("name", FieldKind::String)
//!             .relation("org", "Org")
//!             .hook(Hook::BeforeCreate, |scope| {
//!                 for user in scope.create_data.iter_mut() {
//!                     user.insert("active", true);
//!                 }
//!                 Ok(())
//!             })
//!             .build(),
//!     ])?;
//!     let store = ModelStore::new(InMemoryStore::new(), registry);
//!     let users = store.model("User")?;
//!
//!     // The nested org is created first; the user keeps its identifier
//!     let created = users.create(&doc! { "name": "Alice", "org": { "name": "Acme" } }).await?;
//!
//!     // Reads inline the org again
//!     let alice = users.id(created[0].get_object_id("_id")?).await?;
//!     println!("{alice:?}");
//!
//!     // Soft-removed documents drop out of list results
//!     users.remove(&doc! { "name": "Alice" }).await?;
//!     let page = users.list(json!({ "page": 1, "size": 10 })).await?;
//!     assert_eq!(page.total_records, 0);
//!
//!     store.shutdown().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use docmodel_core::{
    backend, document, error, identifier, model, page, params, query, schema, scope, store,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmodel_memory::{InMemorySession, InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmodel_mongodb::{MongoDbStore, MongoDbStoreBuilder, MongoSession};
}
