//! Resolving loosely-typed query parameters into [`Params`].
//!
//! The routing layer hands over whatever it deserialized from the transport
//! (query strings, JSON bodies) as a [`serde_json::Value`]:
//!
//! ```ignore
//! let params = Params::resolve(json!({
//!     "page": "2",
//!     "size": 10,
//!     "range": "page",
//!     "sort": "-CreatedAt,name",
//!     "project": "name,-secret",
//!     "cond": "{\"name\": {\"$regex\": \"^al\"}}",
//! }))?;
//! ```

use bson::{Bson, Document, oid::ObjectId, ser::serialize_to_bson};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::{
    error::{ModelError, ModelResult},
    query::{Cond, Projection, Sort},
    store::StoreOptions,
};

/// Page size used when none is given in paged mode.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Whether a list returns every match or one page of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Range {
    /// No pagination.
    All,
    /// Skip/limit with page metadata.
    #[default]
    Page,
}

impl Range {
    /// Parses a range mode; anything other than `ALL` (case-insensitive) is `PAGE`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "ALL" => Range::All,
            _ => Range::Page,
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Range::All => write!(f, "ALL"),
            Range::Page => write!(f, "PAGE"),
        }
    }
}

/// Strict query parameters for `list`, `one` and `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    /// Single identifier, string form.
    pub id: Option<String>,
    /// 1-based page number, meaningful in [`Range::Page`] mode.
    pub page: u64,
    /// Page size, meaningful in [`Range::Page`] mode.
    pub size: u64,
    pub range: Range,
    /// Ordered sort keys.
    pub sort: Vec<Sort>,
    pub project: Option<Projection>,
    pub cond: Cond,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            id: None,
            page: 1,
            size: DEFAULT_PAGE_SIZE,
            range: Range::Page,
            sort: Vec::new(),
            project: None,
            cond: Cond::default(),
        }
    }
}

impl Params {
    pub fn new() -> Self {
        Params::default()
    }

    /// Resolves caller input using the default options.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParams`] when a field has the wrong shape or
    /// [`ModelError::InvalidCondition`] when `cond` is not a valid condition.
    pub fn resolve(input: Value) -> ModelResult<Self> {
        Params::resolve_with(input, &StoreOptions::default())
    }

    /// Resolves caller input, taking paging defaults from `options`.
    pub fn resolve_with(input: Value, options: &StoreOptions) -> ModelResult<Self> {
        let raw: RawParams = match input {
            Value::Null => RawParams::default(),
            input => serde_json::from_value(input)
                .map_err(|e| ModelError::InvalidParams(e.to_string()))?,
        };

        let range = raw
            .range
            .as_deref()
            .map(Range::parse)
            .unwrap_or_default();

        let sort = raw
            .sort
            .map(|keys| keys.into_keys().iter().filter_map(|key| Sort::parse(key)).collect())
            .unwrap_or_default();

        let project = raw
            .project
            .map(RawProjection::into_projection)
            .transpose()?
            .filter(|projection| !projection.is_empty());

        let cond = match raw.cond {
            Some(cond) => Cond::from_document(&cond.into_document()?)?,
            None => Cond::default(),
        };

        let params = Params {
            id: raw.id.filter(|id| !id.trim().is_empty()),
            page: raw.page.map(Loose::into_u64).transpose()?.unwrap_or(0),
            size: raw.size.map(Loose::into_u64).transpose()?.unwrap_or(0),
            range,
            sort,
            project,
            cond,
        };

        Ok(params.with_paging_defaults(options.default_page_size))
    }

    /// Fills in page 1 and the default size for paged requests left at zero.
    pub fn with_paging_defaults(mut self, default_size: u64) -> Self {
        if self.range == Range::Page {
            if self.page == 0 {
                self.page = 1;
            }
            if self.size == 0 {
                self.size = default_size;
            }
        }
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_cond(mut self, cond: Cond) -> Self {
        self.cond = cond;
        self
    }

    pub fn with_range(mut self, range: Range) -> Self {
        self.range = range;
        self
    }

    pub fn with_page(mut self, page: u64, size: u64) -> Self {
        self.range = Range::Page;
        self.page = page;
        self.size = size;
        self
    }

    pub fn with_sort(mut self, sort: Vec<Sort>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_project(mut self, project: Projection) -> Self {
        self.project = Some(project).filter(|project| !project.is_empty());
        self
    }

    /// Number of documents skipped before the current page.
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.size)
    }

    /// Number of pages needed to show `total` documents.
    pub fn total_pages(&self, total: u64) -> u64 {
        match self.size {
            0 => 0,
            size => total.div_ceil(size),
        }
    }
}

impl TryFrom<Value> for Params {
    type Error = ModelError;

    fn try_from(input: Value) -> ModelResult<Self> {
        Params::resolve(input)
    }
}

/// Inputs accepted by `list` and `one`.
pub trait IntoParams {
    fn into_params(self, options: &StoreOptions) -> ModelResult<Params>;
}

impl IntoParams for Params {
    fn into_params(self, options: &StoreOptions) -> ModelResult<Params> {
        Ok(self.with_paging_defaults(options.default_page_size))
    }
}

impl IntoParams for Value {
    fn into_params(self, options: &StoreOptions) -> ModelResult<Params> {
        Params::resolve_with(self, options)
    }
}

impl IntoParams for Cond {
    fn into_params(self, options: &StoreOptions) -> ModelResult<Params> {
        Params::new().with_cond(self).into_params(options)
    }
}

/// Inputs accepted by `id`: an identifier string, a native identifier, or
/// params carrying `id`.
pub trait IntoIdParams {
    fn into_id_params(self) -> ModelResult<Params>;
}

impl IntoIdParams for &str {
    fn into_id_params(self) -> ModelResult<Params> {
        Ok(Params::new().with_id(self))
    }
}

impl IntoIdParams for String {
    fn into_id_params(self) -> ModelResult<Params> {
        Ok(Params::new().with_id(self))
    }
}

impl IntoIdParams for ObjectId {
    fn into_id_params(self) -> ModelResult<Params> {
        Ok(Params::new().with_id(self.to_hex()))
    }
}

impl IntoIdParams for Params {
    fn into_id_params(self) -> ModelResult<Params> {
        Ok(self)
    }
}

impl IntoIdParams for Value {
    fn into_id_params(self) -> ModelResult<Params> {
        Params::resolve(self)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawParams {
    #[serde(alias = "ID", alias = "Id")]
    id: Option<String>,
    #[serde(alias = "Page")]
    page: Option<Loose>,
    #[serde(alias = "Size")]
    size: Option<Loose>,
    #[serde(alias = "Range")]
    range: Option<String>,
    #[serde(alias = "Sort")]
    sort: Option<Keys>,
    #[serde(alias = "Project")]
    project: Option<RawProjection>,
    #[serde(alias = "Cond")]
    cond: Option<RawCond>,
}

/// A number that may arrive as text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Loose {
    Number(u64),
    Text(String),
}

impl Loose {
    fn into_u64(self) -> ModelResult<u64> {
        match self {
            Loose::Number(n) => Ok(n),
            Loose::Text(text) if text.trim().is_empty() => Ok(0),
            Loose::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| ModelError::InvalidParams(format!("expected a number, got {text:?}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Keys {
    Joined(String),
    List(Vec<String>),
}

impl Keys {
    fn into_keys(self) -> Vec<String> {
        match self {
            Keys::Joined(joined) => joined.split(',').map(str::to_string).collect(),
            Keys::List(list) => list,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawProjection {
    Keys(Keys),
    Map(Map<String, Value>),
}

impl RawProjection {
    fn into_projection(self) -> ModelResult<Projection> {
        let mut projection = Projection::new();

        match self {
            RawProjection::Keys(keys) => {
                for key in keys.into_keys() {
                    projection.push_key(&key);
                }
            }
            RawProjection::Map(map) => {
                for (field, flag) in map {
                    let included = match flag {
                        Value::Bool(flag) => flag,
                        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
                        other => {
                            return Err(ModelError::InvalidParams(format!(
                                "project.{field}: expected 0 or 1, got {other}"
                            )));
                        }
                    };
                    projection = if included {
                        projection.include(field)
                    } else {
                        projection.exclude(field)
                    };
                }
            }
        }

        Ok(projection)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCond {
    Serialized(String),
    Structured(Map<String, Value>),
}

impl RawCond {
    fn into_document(self) -> ModelResult<Document> {
        let structured = match self {
            RawCond::Serialized(text) if text.trim().is_empty() => return Ok(Document::new()),
            RawCond::Serialized(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(ModelError::InvalidParams("cond must be a JSON object".to_string()));
                }
                Err(e) => return Err(ModelError::InvalidParams(format!("cond: {e}"))),
            },
            RawCond::Structured(map) => map,
        };

        match serialize_to_bson(&structured)? {
            Bson::Document(document) => Ok(document),
            _ => Err(ModelError::InvalidParams("cond must be an object".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Filter;
    use bson::doc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn defaults_to_first_page() {
        let params = Params::resolve(json!({})).unwrap();
        assert_eq!(params.range, Range::Page);
        assert_eq!(params.page, 1);
        assert_eq!(params.size, 20);
        assert!(params.cond.is_empty());

        let params = Params::resolve(json!({ "range": "bogus", "page": 0, "size": "" })).unwrap();
        assert_eq!(params.range, Range::Page);
        assert_eq!((params.page, params.size), (1, 20));
    }

    #[test]
    fn all_range_leaves_paging_unset() {
        let params = Params::resolve(json!({ "range": "all" })).unwrap();
        assert_eq!(params.range, Range::All);
        assert_eq!((params.page, params.size), (0, 0));
    }

    #[test]
    fn sort_keeps_order_and_direction() {
        let params = Params::resolve(json!({ "sort": "-CreatedAt,name" })).unwrap();
        assert_eq!(params.sort, vec![Sort::desc("CreatedAt"), Sort::asc("name")]);

        let params = Params::resolve(json!({ "sort": ["b", "-a"] })).unwrap();
        assert_eq!(params.sort, vec![Sort::asc("b"), Sort::desc("a")]);
    }

    #[test]
    fn project_accepts_prefixes_and_maps() {
        let params = Params::resolve(json!({ "project": "name,-secret" })).unwrap();
        assert_eq!(
            params.project.unwrap().to_document(),
            doc! { "name": 1, "secret": 0 }
        );

        let params = Params::resolve(json!({ "project": { "name": 1, "org": 0 } })).unwrap();
        assert_eq!(params.project.unwrap().to_document(), doc! { "name": 1, "org": 0 });
    }

    #[test]
    fn serialized_cond_is_parsed_and_sanitized() {
        let params = Params::resolve(json!({
            "cond": "{\"name\": \"x\", \"$where\": \"this.a == 1\"}",
        }))
        .unwrap();
        assert_eq!(params.cond, Filter::eq("name", "x"));

        let params = Params::resolve(json!({ "cond": { "age": { "$gte": 3 } } })).unwrap();
        assert_eq!(params.cond, Filter::gte("age", 3i64));

        let params = Params::resolve(json!({
            "cond": {
                "$nor": [ { "$where": "sleep(5000)" } ],
                "name": { "$not": { "$where": "x" } },
            },
        }))
        .unwrap();
        assert_eq!(params.cond.to_document().unwrap(), doc! {});
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            Params::resolve(json!({ "cond": "{not json" })),
            Err(ModelError::InvalidParams(_))
        ));
        assert!(matches!(
            Params::resolve(json!({ "page": "two" })),
            Err(ModelError::InvalidParams(_))
        ));
    }

    #[test]
    fn accepts_capitalized_keys() {
        let params = Params::resolve(json!({ "ID": "abc", "Page": 3, "Size": 5 })).unwrap();
        assert_eq!(params.id.as_deref(), Some("abc"));
        assert_eq!((params.page, params.size), (3, 5));
    }

    #[test]
    fn paging_math() {
        let params = Params::new().with_page(2, 10);
        assert_eq!(params.offset(), 10);
        assert_eq!(params.total_pages(25), 3);
        assert_eq!(params.total_pages(0), 0);
    }
}
