//! In-memory document storage backend for docmodel.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! `StoreBackend` trait. It uses async-aware read-write locks for concurrent
//! access and is meant for development, tests and small deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Session tracking** - [`InMemoryStore::active_sessions`] shows whether operations released their sessions
//! - **Condition evaluation** - Comparison, membership, existence and regex predicates, with dotted paths
//! - **Update operators** - `$set`, `$unset` and `$inc`
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::prelude::*;
//! use docmodel_memory::InMemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let registry = SchemaRegistry::new([Schema::builder("User", "users").build()])?;
//!     let store = ModelStore::new(backend, registry);
//!
//!     store.model("User")?.create(&doc! { "name": "Alice" }).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod store;
mod evaluator;

pub use store::{InMemorySession, InMemoryStore, InMemoryStoreBuilder};
