//! Main entry point tying a backend to a set of schemas.
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryStore};
//!
//! let registry = SchemaRegistry::new([Schema::builder("User", "users").build()])?;
//! let store = ModelStore::new(InMemoryStore::new(), registry);
//!
//! let users = store.model("User")?;
//! users.create(&doc! { "name": "Alice" }).await?;
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    backend::StoreBackend,
    error::ModelResult,
    model::Model,
    params::DEFAULT_PAGE_SIZE,
    schema::SchemaRegistry,
};

/// Default layout of the human-readable audit timestamps.
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Engine-wide settings.
///
/// Deserializable so it can be lifted straight out of an application config file;
/// missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Page size used by paged lists that don't ask for one.
    pub default_page_size: u64,
    /// `chrono` format string for `CreatedAtFmt`/`UpdatedAtFmt`.
    pub time_format: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            default_page_size: DEFAULT_PAGE_SIZE,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
        }
    }
}

/// A backend plus the schemas it serves.
#[derive(Debug)]
pub struct ModelStore<B: StoreBackend> {
    backend: B,
    registry: SchemaRegistry,
    options: StoreOptions,
}

impl<B: StoreBackend> ModelStore<B> {
    pub fn new(backend: B, registry: SchemaRegistry) -> Self {
        Self {
            backend,
            registry,
            options: StoreOptions::default(),
        }
    }

    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the model registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::SchemaNotFound`](crate::error::ModelError::SchemaNotFound)
    /// if no schema has that name.
    pub fn model<'a>(&'a self, name: &str) -> ModelResult<Model<'a, B>> {
        Ok(Model::new(
            self.registry.get(name)?,
            &self.backend,
            &self.registry,
            &self.options,
        ))
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub async fn shutdown(self) -> ModelResult<()> {
        self.backend.shutdown().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_fill_missing_keys() {
        let options: StoreOptions = serde_json::from_str(r#"{ "default_page_size": 50 }"#).unwrap();

        assert_eq!(options.default_page_size, 50);
        assert_eq!(options.time_format, DEFAULT_TIME_FORMAT);
    }
}
