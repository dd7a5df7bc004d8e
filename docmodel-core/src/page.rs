//! The `list` result envelope.
//!
//! Serializes to `{list, totalrecords}` plus `totalpages`/`page`/`size` in paged
//! mode and echoes of the `sort`, `project`, `cond` and `range` that produced it.

use bson::{Document, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    document::from_document,
    error::{ModelError, ModelResult},
    params::{Params, Range},
    query::{Cond, Projection, Sort},
};

/// One `list` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListResult {
    /// The documents of this page (or all matches in [`Range::All`] mode).
    pub list: Vec<Document>,
    /// Total count of matching documents across all pages.
    #[serde(rename = "totalrecords")]
    pub total_records: u64,
    #[serde(rename = "totalpages", skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Sort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<Projection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cond: Option<Cond>,
    pub range: Range,
}

impl ListResult {
    /// Builds the envelope for `list` given the params that produced it.
    pub fn new(list: Vec<Document>, total_records: u64, params: &Params) -> Self {
        let paged = params.range == Range::Page;

        ListResult {
            list,
            total_records,
            total_pages: paged.then(|| params.total_pages(total_records)),
            page: paged.then_some(params.page),
            size: paged.then_some(params.size),
            sort: params.sort.clone(),
            project: params.project.clone(),
            cond: Some(params.cond.clone()).filter(|cond| !cond.is_empty()),
            range: params.range,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Deserializes every listed document into a caller type.
    pub fn list_as<T: DeserializeOwned>(&self) -> ModelResult<Vec<T>> {
        self.list.iter().cloned().map(from_document).collect()
    }

    /// Renders the envelope as a document.
    pub fn to_document(&self) -> ModelResult<Document> {
        match serialize_to_bson(self)? {
            bson::Bson::Document(document) => Ok(document),
            _ => Err(ModelError::Serialization("list envelope is not a document".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Filter;
    use bson::doc;
    use pretty_assertions::assert_eq;

    #[test]
    fn paged_envelope() {
        let params = Params::new()
            .with_page(2, 10)
            .with_sort(vec![Sort::desc("age")])
            .with_cond(Filter::eq("name", "x"));
        let result = ListResult::new(vec![doc! { "name": "x" }], 25, &params);

        assert_eq!(
            result.to_document().unwrap(),
            doc! {
                "list": [ { "name": "x" } ],
                "totalrecords": 25i64,
                "totalpages": 3i64,
                "page": 2i64,
                "size": 10i64,
                "sort": ["-age"],
                "cond": { "name": "x" },
                "range": "PAGE",
            }
        );
    }

    #[test]
    fn unpaged_envelope_omits_page_metadata() {
        let params = Params::new().with_range(Range::All);
        let result = ListResult::new(Vec::new(), 0, &params);
        let document = result.to_document().unwrap();

        assert_eq!(document, doc! { "list": [], "totalrecords": 0i64, "range": "ALL" });
    }
}
