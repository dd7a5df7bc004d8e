//! Condition trees, projections, sort keys and find queries.
//!
//! Conditions arrive from callers in the familiar Mongo-like document shape
//! (`{"name": "x", "age": {"$gt": 18}, "$or": [...]}`) and are parsed into a
//! [`Cond`] tree, which the engine rewrites (identifier normalization, implicit
//! soft-delete filter) before handing it to a store backend. Backends consume the
//! tree through the [`CondVisitor`] trait; [`Cond::to_document`] renders it back
//! into the external shape.
//!
//! ```ignore
//! use docmodel::query::{Cond, Filter, FindQuery, SortDirection};
//! use bson::doc;
//!
//! let cond = Cond::from_document(&doc! { "name": "Alice" })?
//!     .and(Filter::gt("age", 18));
//!
//! let query = FindQuery::builder()
//!     .filter(cond)
//!     .sort("CreatedAt", SortDirection::Desc)
//!     .limit(10)
//!     .build();
//! ```

use bson::{Bson, Document, doc};
use serde::{Serialize, Serializer};
use std::fmt;

use crate::error::{ModelError, ModelResult};

/// Operator that lets callers ship server-side code; never forwarded to a store.
pub const WHERE_OPERATOR: &str = "$where";

/// Operators carrying server-side code. They are dropped wherever they appear
/// in a condition, including inside operands forwarded as [`Cond::Raw`].
pub const CODE_OPERATORS: [&str; 3] = [WHERE_OPERATOR, "$function", "$accumulator"];

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// A single sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Sort { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Sort { field: field.into(), direction: SortDirection::Desc }
    }

    /// Parses a sort key, where a leading `-` means descending.
    ///
    /// Returns `None` for blank keys.
    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim();

        match key.strip_prefix('-') {
            Some(field) if !field.trim().is_empty() => Some(Sort::desc(field.trim())),
            Some(_) => None,
            None if key.is_empty() => None,
            None => Some(Sort::asc(key.trim_start_matches('+'))),
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Asc => write!(f, "{}", self.field),
            SortDirection::Desc => write!(f, "-{}", self.field),
        }
    }
}

impl Serialize for Sort {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Field projection: which fields a find returns.
///
/// Mixing inclusions and exclusions in one projection is a caller error that is
/// not rejected here; a projection with any inclusion (other than `_id`) is
/// treated as inclusion-mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    fields: Vec<(String, bool)>,
}

impl Projection {
    pub fn new() -> Self {
        Projection::default()
    }

    /// Adds an inclusion entry.
    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.set(field.into(), true);
        self
    }

    /// Adds an exclusion entry.
    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.set(field.into(), false);
        self
    }

    /// Adds an entry from its textual form, `-field` meaning exclusion.
    pub fn push_key(&mut self, key: &str) {
        let key = key.trim();

        match key.strip_prefix('-') {
            Some(field) if !field.is_empty() => self.set(field.to_string(), false),
            Some(_) => {}
            None if key.is_empty() => {}
            None => self.set(key.to_string(), true),
        }
    }

    fn set(&mut self, field: String, included: bool) {
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = included,
            None => self.fields.push((field, included)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.fields.iter().map(|(field, included)| (field.as_str(), *included))
    }

    /// Returns `true` when the projection lists the fields to keep.
    pub fn is_inclusion(&self) -> bool {
        self.fields
            .iter()
            .any(|(field, included)| *included && field != "_id")
    }

    /// Returns `true` if a top-level field survives this projection.
    pub fn allows(&self, field: &str) -> bool {
        let nested = format!("{field}.");

        if let Some((_, included)) = self.fields.iter().find(|(name, _)| name == field) {
            return *included;
        }
        if self.is_inclusion() {
            return field == "_id"
                || self
                    .fields
                    .iter()
                    .any(|(name, included)| *included && name.starts_with(&nested));
        }

        true
    }

    /// Renders the projection as `{field: 1|0}`.
    pub fn to_document(&self) -> Document {
        self.fields
            .iter()
            .map(|(field, included)| (field.clone(), Bson::Int32(i32::from(*included))))
            .collect()
    }
}

impl Serialize for Projection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

/// Field comparison operators for condition predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to; matches array fields containing the value.
    Eq,
    /// Not equal to; missing fields match.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Equal to any value of an array.
    In,
    /// Equal to none of the values of an array.
    Nin,
    /// The field exists (`true`) or is missing (`false`).
    Exists,
    /// Matches `{"$regex": pattern, "$options": flags}`.
    Regex,
}

impl FieldOp {
    /// Maps a `$`-operator name to its predicate operator.
    pub fn from_operator(operator: &str) -> Option<Self> {
        match operator {
            "$eq" => Some(FieldOp::Eq),
            "$ne" => Some(FieldOp::Ne),
            "$gt" => Some(FieldOp::Gt),
            "$gte" => Some(FieldOp::Gte),
            "$lt" => Some(FieldOp::Lt),
            "$lte" => Some(FieldOp::Lte),
            "$in" => Some(FieldOp::In),
            "$nin" => Some(FieldOp::Nin),
            "$exists" => Some(FieldOp::Exists),
            "$regex" => Some(FieldOp::Regex),
            _ => None,
        }
    }

    pub fn operator(&self) -> &'static str {
        match self {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::In => "$in",
            FieldOp::Nin => "$nin",
            FieldOp::Exists => "$exists",
            FieldOp::Regex => "$regex",
        }
    }
}

/// A condition tree.
///
/// The root of a parsed condition is an implicit conjunction; an empty `And`
/// matches every document.
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    /// All children must match.
    And(Vec<Cond>),
    /// Any child must match.
    Or(Vec<Cond>),
    /// A predicate on one field.
    Field {
        /// The field name (dotted paths address nested documents).
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The operand.
        value: Bson,
    },
    /// An operator this crate does not model, forwarded to the store untouched.
    Raw(Document),
}

impl Default for Cond {
    fn default() -> Self {
        Cond::And(Vec::new())
    }
}

impl Cond {
    /// Creates a field predicate.
    pub fn field(field: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> Self {
        Cond::Field { field: field.into(), op, value: value.into() }
    }

    /// Returns `true` if the condition matches every document.
    pub fn is_empty(&self) -> bool {
        matches!(self, Cond::And(children) if children.is_empty())
    }

    /// Combines this condition with another using logical AND.
    ///
    /// If this condition is already an AND, the other condition is appended
    /// to the list. Otherwise, a new AND is created.
    pub fn and(self, other: Cond) -> Self {
        match self {
            Cond::And(mut list) => {
                list.push(other);
                Cond::And(list)
            }
            _ => Cond::And(vec![self, other]),
        }
    }

    /// Combines this condition with another using logical OR.
    pub fn or(self, other: Cond) -> Self {
        match self {
            Cond::Or(mut list) => {
                list.push(other);
                Cond::Or(list)
            }
            _ => Cond::Or(vec![self, other]),
        }
    }

    /// Returns `true` if every document matched by this condition went through
    /// a predicate on `field`.
    ///
    /// A conjunction constrains the field when any of its children does; a
    /// disjunction only when all of its branches do.
    pub fn constrains(&self, field: &str) -> bool {
        match self {
            Cond::And(children) => children.iter().any(|child| child.constrains(field)),
            Cond::Or(children) => {
                !children.is_empty() && children.iter().all(|child| child.constrains(field))
            }
            Cond::Field { field: name, .. } => name == field,
            Cond::Raw(raw) => raw.contains_key(field),
        }
    }

    /// Parses the external document shape into a condition tree.
    ///
    /// `$where` is dropped at every level, and code operators (see
    /// [`CODE_OPERATORS`]) are stripped from the operands of raw operators.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidCondition`] for malformed boolean groups or operators.
    pub fn from_document(document: &Document) -> ModelResult<Self> {
        let mut children = Vec::with_capacity(document.len());

        for (key, value) in document {
            match key.as_str() {
                "$and" => children.push(Cond::And(parse_group(key, value)?)),
                "$or" => children.push(Cond::Or(parse_group(key, value)?)),
                operator if CODE_OPERATORS.contains(&operator) => {
                    tracing::debug!("dropping {operator} from condition");
                }
                operator if operator.starts_with('$') => {
                    if let Some(value) = strip_code(value.clone()) {
                        children.push(Cond::Raw(doc! { operator: value }));
                    }
                }
                field => children.push(parse_field(field, value)?),
            }
        }

        Ok(match children.len() {
            1 => children.remove(0),
            _ => Cond::And(children),
        })
    }

    /// Renders the condition back into the external document shape.
    pub fn to_document(&self) -> ModelResult<Document> {
        CondRenderer.visit_cond(self)
    }
}

impl TryFrom<Document> for Cond {
    type Error = ModelError;

    fn try_from(document: Document) -> ModelResult<Self> {
        Cond::from_document(&document)
    }
}

impl Serialize for Cond {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document()
            .map_err(<S::Error as serde::ser::Error>::custom)?
            .serialize(serializer)
    }
}

fn parse_group(operator: &str, value: &Bson) -> ModelResult<Vec<Cond>> {
    let items = match value {
        Bson::Array(items) if !items.is_empty() => items,
        Bson::Array(_) => {
            return Err(ModelError::InvalidCondition(format!("{operator} must not be empty")));
        }
        _ => {
            return Err(ModelError::InvalidCondition(format!("{operator} must be an array")));
        }
    };

    items
        .iter()
        .map(|item| match item {
            Bson::Document(document) => Cond::from_document(document),
            _ => Err(ModelError::InvalidCondition(format!(
                "{operator} elements must be documents"
            ))),
        })
        .collect()
}

fn parse_field(field: &str, value: &Bson) -> ModelResult<Cond> {
    let operators = match value {
        Bson::Document(document) if !document.is_empty() => {
            let dollar = document.keys().filter(|key| key.starts_with('$')).count();

            if dollar == 0 {
                return Ok(Cond::field(field, FieldOp::Eq, value.clone()));
            }
            if dollar != document.len() {
                return Err(ModelError::InvalidCondition(format!(
                    "{field}: operators cannot be mixed with plain fields"
                )));
            }

            document
        }
        _ => return Ok(Cond::field(field, FieldOp::Eq, value.clone())),
    };

    let mut predicates = Vec::with_capacity(operators.len());

    for (operator, operand) in operators {
        match FieldOp::from_operator(operator) {
            Some(FieldOp::Regex) => {
                let options = match operators.get("$options") {
                    None => String::new(),
                    Some(Bson::String(options)) => options.clone(),
                    Some(_) => {
                        return Err(ModelError::InvalidCondition(format!(
                            "{field}: $options must be a string"
                        )));
                    }
                };
                let pattern = match operand {
                    Bson::String(pattern) => pattern.clone(),
                    _ => {
                        return Err(ModelError::InvalidCondition(format!(
                            "{field}: $regex must be a string"
                        )));
                    }
                };

                predicates.push(Cond::field(
                    field,
                    FieldOp::Regex,
                    doc! { "$regex": pattern, "$options": options },
                ));
            }
            Some(FieldOp::Exists) => {
                let exists = match operand {
                    Bson::Boolean(exists) => *exists,
                    Bson::Int32(n) => *n != 0,
                    Bson::Int64(n) => *n != 0,
                    _ => {
                        return Err(ModelError::InvalidCondition(format!(
                            "{field}: $exists must be a boolean"
                        )));
                    }
                };

                predicates.push(Cond::field(field, FieldOp::Exists, exists));
            }
            Some(op @ (FieldOp::In | FieldOp::Nin)) => {
                if !matches!(operand, Bson::Array(_)) {
                    return Err(ModelError::InvalidCondition(format!(
                        "{field}: {operator} must be an array"
                    )));
                }

                predicates.push(Cond::field(field, op, operand.clone()));
            }
            Some(op) => predicates.push(Cond::field(field, op, operand.clone())),
            None if operator == "$options" => {
                if !operators.contains_key("$regex") {
                    return Err(ModelError::InvalidCondition(format!(
                        "{field}: $options without $regex"
                    )));
                }
            }
            None if CODE_OPERATORS.contains(&operator.as_str()) => {
                tracing::debug!("dropping {operator} from {field}");
            }
            None => {
                if let Some(operand) = strip_code(operand.clone()) {
                    predicates.push(Cond::Raw(doc! { field: { operator: operand } }));
                }
            }
        }
    }

    Ok(match predicates.len() {
        1 => predicates.remove(0),
        _ => Cond::And(predicates),
    })
}

/// Removes code operators from a raw operand at any depth.
///
/// Returns `None` when a document or array held nothing but code operators.
fn strip_code(value: Bson) -> Option<Bson> {
    match value {
        Bson::Document(document) => {
            let had_keys = !document.is_empty();
            let stripped: Document = document
                .into_iter()
                .filter(|(key, _)| !CODE_OPERATORS.contains(&key.as_str()))
                .filter_map(|(key, value)| strip_code(value).map(|value| (key, value)))
                .collect();

            (!had_keys || !stripped.is_empty()).then_some(Bson::Document(stripped))
        }
        Bson::Array(items) => {
            let had_items = !items.is_empty();
            let stripped: Vec<Bson> = items.into_iter().filter_map(strip_code).collect();

            (!had_items || !stripped.is_empty()).then_some(Bson::Array(stripped))
        }
        other => Some(other),
    }
}

/// Visitor over a condition tree, implemented by renderers and evaluators.
pub trait CondVisitor {
    type Output;
    type Error: Into<ModelError>;

    fn visit_and(&mut self, conds: &[Cond]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, conds: &[Cond]) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_raw(&mut self, raw: &Document) -> Result<Self::Output, Self::Error>;

    fn visit_cond(&mut self, cond: &Cond) -> Result<Self::Output, Self::Error> {
        match cond {
            Cond::And(conds) => self.visit_and(conds),
            Cond::Or(conds) => self.visit_or(conds),
            Cond::Field { field, op, value } => self.visit_field(field, op, value),
            Cond::Raw(raw) => self.visit_raw(raw),
        }
    }
}

/// Renders a condition tree into the external document shape.
pub struct CondRenderer;

impl CondVisitor for CondRenderer {
    type Output = Document;
    type Error = ModelError;

    fn visit_and(&mut self, conds: &[Cond]) -> ModelResult<Document> {
        let rendered = conds
            .iter()
            .map(|cond| self.visit_cond(cond))
            .collect::<ModelResult<Vec<_>>>()?;

        let mut merged = Document::new();
        for document in &rendered {
            for (key, value) in document {
                if merged.contains_key(key) {
                    return Ok(doc! { "$and": rendered });
                }
                merged.insert(key.clone(), value.clone());
            }
        }

        Ok(merged)
    }

    fn visit_or(&mut self, conds: &[Cond]) -> ModelResult<Document> {
        Ok(doc! {
            "$or": conds
                .iter()
                .map(|cond| self.visit_cond(cond))
                .collect::<ModelResult<Vec<_>>>()?,
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> ModelResult<Document> {
        Ok(match (op, value) {
            (FieldOp::Eq, Bson::Document(_)) => doc! { field: { "$eq": value.clone() } },
            (FieldOp::Eq, _) => doc! { field: value.clone() },
            (FieldOp::Regex, Bson::Document(regex)) => doc! { field: regex.clone() },
            (op, _) => doc! { field: { op.operator(): value.clone() } },
        })
    }

    fn visit_raw(&mut self, raw: &Document) -> ModelResult<Document> {
        Ok(raw.clone())
    }
}

/// Helper struct for constructing predicates.
///
/// ```ignore
/// use docmodel::query::Filter;
///
/// let cond = Filter::eq("name", "Alice").and(Filter::ne("IsDeleted", true));
/// ```
pub struct Filter;

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Cond {
        Cond::field(field, FieldOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Cond {
        Cond::field(field, FieldOp::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Cond {
        Cond::field(field, FieldOp::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Cond {
        Cond::field(field, FieldOp::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Cond {
        Cond::field(field, FieldOp::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Cond {
        Cond::field(field, FieldOp::Lte, value)
    }

    /// Matches documents whose field equals any of the values.
    pub fn any_of<V: Into<Bson>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Cond {
        Cond::field(
            field,
            FieldOp::In,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents whose field equals none of the values.
    pub fn none_of<V: Into<Bson>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Cond {
        Cond::field(
            field,
            FieldOp::Nin,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn exists(field: impl Into<String>) -> Cond {
        Cond::field(field, FieldOp::Exists, true)
    }

    pub fn not_exists(field: impl Into<String>) -> Cond {
        Cond::field(field, FieldOp::Exists, false)
    }

    pub fn and(conds: impl IntoIterator<Item = Cond>) -> Cond {
        Cond::And(conds.into_iter().collect())
    }

    pub fn or(conds: impl IntoIterator<Item = Cond>) -> Cond {
        Cond::Or(conds.into_iter().collect())
    }
}

/// A find request as seen by a store backend.
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    /// Condition documents must match.
    pub filter: Cond,
    /// Fields to return.
    pub projection: Option<Projection>,
    /// Sort keys, applied in order.
    pub sort: Vec<Sort>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
}

impl FindQuery {
    pub fn new(filter: Cond) -> Self {
        FindQuery { filter, ..FindQuery::default() }
    }

    pub fn builder() -> FindQueryBuilder {
        FindQueryBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindQueryBuilder {
    query: FindQuery,
}

impl FindQueryBuilder {
    pub fn new() -> Self {
        FindQueryBuilder::default()
    }

    pub fn filter(mut self, filter: Cond) -> Self {
        self.query.filter = filter;
        self
    }

    pub fn projection(mut self, projection: Option<Projection>) -> Self {
        self.query.projection = projection.filter(|projection| !projection.is_empty());
        self
    }

    /// Appends a sort key.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort { field: field.into(), direction });
        self
    }

    /// Replaces all sort keys.
    pub fn sorts(mut self, sort: Vec<Sort>) -> Self {
        self.query.sort = sort;
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.query.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn build(self) -> FindQuery {
        self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_plain_and_operator_predicates() {
        let cond = Cond::from_document(&doc! {
            "name": "x",
            "age": { "$gt": 18, "$lte": 65 },
        })
        .unwrap();

        assert_eq!(
            cond,
            Cond::And(vec![
                Filter::eq("name", "x"),
                Cond::And(vec![Filter::gt("age", 18), Filter::lte("age", 65)]),
            ])
        );
    }

    #[test]
    fn single_predicate_is_not_wrapped() {
        let cond = Cond::from_document(&doc! { "name": "x" }).unwrap();
        assert_eq!(cond, Filter::eq("name", "x"));
    }

    #[test]
    fn strips_where_at_every_level() {
        let cond = Cond::from_document(&doc! {
            "$where": "sleep(1000)",
            "$or": [ { "a": 1, "$where": "true" }, { "b": 2 } ],
        })
        .unwrap();

        let rendered = cond.to_document().unwrap();
        assert_eq!(rendered, doc! { "$or": [ { "a": 1 }, { "b": 2 } ] });
    }

    #[test]
    fn strips_code_from_raw_operands() {
        let render = |document: Document| {
            Cond::from_document(&document).unwrap().to_document().unwrap()
        };

        assert_eq!(
            render(doc! { "$nor": [ { "$where": "sleep(5000)" } ], "a": 1 }),
            doc! { "a": 1 }
        );
        assert_eq!(
            render(doc! { "$nor": [ { "$where": "sleep(5000)" }, { "b": 2 } ] }),
            doc! { "$nor": [ { "b": 2 } ] }
        );
        assert_eq!(
            render(doc! {
                "$expr": {
                    "$function": { "body": "function() { sleep(5000) }", "args": [], "lang": "js" }
                }
            }),
            doc! {}
        );
        assert_eq!(
            render(doc! { "$expr": { "$eq": [ { "$accumulator": { "init": "x" } }, "$a" ] } }),
            doc! { "$expr": { "$eq": [ "$a" ] } }
        );
        assert_eq!(render(doc! { "name": { "$not": { "$where": "x" } } }), doc! {});
        assert_eq!(render(doc! { "name": { "$where": "x" } }), doc! {});
        assert_eq!(
            render(doc! { "tags": { "$elemMatch": { "k": 1, "$where": "x" } } }),
            doc! { "tags": { "$elemMatch": { "k": 1 } } }
        );
    }

    #[test]
    fn rejects_malformed_groups() {
        assert!(matches!(
            Cond::from_document(&doc! { "$and": [] }),
            Err(ModelError::InvalidCondition(_))
        ));
        assert!(matches!(
            Cond::from_document(&doc! { "$or": { "a": 1 } }),
            Err(ModelError::InvalidCondition(_))
        ));
        assert!(matches!(
            Cond::from_document(&doc! { "a": { "$in": 1 } }),
            Err(ModelError::InvalidCondition(_))
        ));
        assert!(matches!(
            Cond::from_document(&doc! { "a": { "$gt": 1, "b": 2 } }),
            Err(ModelError::InvalidCondition(_))
        ));
    }

    #[test]
    fn keeps_unknown_operators_raw() {
        let cond = Cond::from_document(&doc! { "tags": { "$size": 2 } }).unwrap();
        assert_eq!(cond, Cond::Raw(doc! { "tags": { "$size": 2 } }));
        assert!(cond.constrains("tags"));
    }

    #[test]
    fn folds_regex_options() {
        let cond =
            Cond::from_document(&doc! { "name": { "$regex": "^al", "$options": "i" } }).unwrap();
        assert_eq!(
            cond,
            Cond::field("name", FieldOp::Regex, doc! { "$regex": "^al", "$options": "i" })
        );
    }

    #[test]
    fn renders_conjunctions_and_falls_back_on_collisions() {
        let merged = Filter::and([Filter::eq("a", 1), Filter::ne("b", true)]);
        assert_eq!(merged.to_document().unwrap(), doc! { "a": 1, "b": { "$ne": true } });

        let colliding = Filter::and([Filter::gt("a", 1), Filter::lt("a", 5)]);
        assert_eq!(
            colliding.to_document().unwrap(),
            doc! { "$and": [ { "a": { "$gt": 1 } }, { "a": { "$lt": 5 } } ] }
        );
    }

    #[test]
    fn constrains_follows_boolean_structure() {
        let direct = Cond::from_document(&doc! { "IsDeleted": true }).unwrap();
        assert!(direct.constrains("IsDeleted"));

        let in_and =
            Cond::from_document(&doc! { "$and": [ { "a": 1 }, { "IsDeleted": false } ] }).unwrap();
        assert!(in_and.constrains("IsDeleted"));

        let partial_or =
            Cond::from_document(&doc! { "$or": [ { "a": 1 }, { "IsDeleted": true } ] }).unwrap();
        assert!(!partial_or.constrains("IsDeleted"));

        let full_or = Cond::from_document(&doc! {
            "$or": [ { "IsDeleted": true }, { "IsDeleted": { "$exists": false } } ]
        })
        .unwrap();
        assert!(full_or.constrains("IsDeleted"));

        assert!(!Cond::default().constrains("IsDeleted"));
    }

    #[test]
    fn sort_and_projection_keys() {
        assert_eq!(Sort::parse("-age"), Some(Sort::desc("age")));
        assert_eq!(Sort::parse("name"), Some(Sort::asc("name")));
        assert_eq!(Sort::parse(" "), None);
        assert_eq!(Sort::desc("age").to_string(), "-age");

        let mut projection = Projection::new();
        projection.push_key("name");
        projection.push_key("-secret");
        assert_eq!(projection.to_document(), doc! { "name": 1, "secret": 0 });
        assert!(projection.is_inclusion());
        assert!(projection.allows("name"));
        assert!(projection.allows("_id"));
        assert!(!projection.allows("org"));

        let exclusion = Projection::new().exclude("org");
        assert!(!exclusion.allows("org"));
        assert!(exclusion.allows("name"));
    }
}
