//! MongoDB backend implementation for docmodel.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait.
//! Conditions are rendered into MongoDB filter documents and evaluated by the
//! server; every model operation runs on its own driver session.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmodel = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{backend::StoreBackendBuilder, mongodb::MongoDbStore, prelude::*};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!     let registry = SchemaRegistry::new([Schema::builder("User", "users").build()])?;
//!     let store = ModelStore::new(backend, registry);
//!
//!     store.model("User")?.create(&doc! { "name": "Alice" }).await?;
//!     store.shutdown().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder, MongoSession};
