//! Condition evaluation for in-memory document filtering.
//!
//! Matching follows the document-store conventions callers expect from the
//! MongoDB backend: a missing field compares as `null` (so `{"$ne": true}`
//! matches documents without the field), equality against an array field
//! matches any of its elements, and ordering comparisons only hold between
//! values of the same type.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use regex::{Regex, RegexBuilder};

use docmodel_core::{
    error::{ModelError, ModelResult},
    query::{Cond, CondVisitor, FieldOp},
};


/// Type-erased, comparable representation of BSON values.
///
/// All numeric types are normalized to `f64`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    ObjectId(ObjectId),
    DateTime(DateTime),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            _ => Comparable::Null,
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's type in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// Total order used for sorting: by type first, then by value.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.partial_cmp(other).unwrap_or(Ordering::Equal))
    }

    /// Equality as used by `$eq`: an array matches when it equals the operand
    /// or contains it.
    fn matches(&self, operand: &Comparable<'a>) -> bool {
        match self {
            Comparable::Array(items) => self == operand || items.iter().any(|item| item == operand),
            value => value == operand,
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Resolves a possibly dotted field path inside a document.
///
/// Numeric segments index into arrays.
pub(crate) fn lookup<'d>(document: &'d Document, path: &str) -> Option<&'d Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}


/// Evaluates condition trees against documents.
///
/// Compiled `$regex` patterns are kept for the lifetime of the evaluator, so one
/// evaluator should be reused across the documents of a scan.
#[derive(Default)]
pub(crate) struct DocumentEvaluator<'a> {
    document: Option<&'a Document>,
    patterns: HashMap<String, Regex>,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(&mut self, document: &'a Document, cond: &Cond) -> ModelResult<bool> {
        self.document = Some(document);
        self.visit_cond(cond)
    }

    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        cond: &Cond,
    ) -> ModelResult<Vec<&'a Document>> {
        let mut evaluator = DocumentEvaluator::new();
        let mut matched = Vec::new();

        for document in documents {
            if evaluator.evaluate(document, cond)? {
                matched.push(document);
            }
        }

        Ok(matched)
    }

    fn field(&self, field: &str) -> Option<&'a Bson> {
        self.document.and_then(|document| lookup(document, field))
    }

    fn pattern(&mut self, field: &str, operand: &Bson) -> ModelResult<&Regex> {
        let (pattern, options) = match operand {
            Bson::Document(regex) => (
                regex.get_str("$regex").unwrap_or_default(),
                regex.get_str("$options").unwrap_or_default(),
            ),
            Bson::String(pattern) => (pattern.as_str(), ""),
            _ => {
                return Err(ModelError::InvalidCondition(format!(
                    "{field}: $regex must be a string"
                )));
            }
        };

        let key = format!("{options}/{pattern}");
        if !self.patterns.contains_key(&key) {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(options.contains('i'))
                .multi_line(options.contains('m'))
                .dot_matches_new_line(options.contains('s'))
                .ignore_whitespace(options.contains('x'))
                .build()
                .map_err(|e| ModelError::InvalidCondition(format!("{field}: {e}")))?;
            self.patterns.insert(key.clone(), regex);
        }

        self.patterns
            .get(&key)
            .ok_or_else(|| ModelError::InvalidCondition(format!("{field}: invalid $regex")))
    }
}

fn any_of(field_value: &Comparable<'_>, operand: &Bson) -> ModelResult<bool> {
    match operand {
        Bson::Array(values) => Ok(
            values
                .iter()
                .any(|value| field_value.matches(&Comparable::from(value)))
        ),
        _ => Err(ModelError::InvalidCondition("$in/$nin expect an array".to_string())),
    }
}

impl<'a> CondVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = ModelError;

    fn visit_and(&mut self, conds: &[Cond]) -> Result<Self::Output, Self::Error> {
        for cond in conds {
            if !self.visit_cond(cond)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, conds: &[Cond]) -> Result<Self::Output, Self::Error> {
        for cond in conds {
            if self.visit_cond(cond)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error> {
        let found = self.field(field);
        let field_value = found.map(Comparable::from).unwrap_or(Comparable::Null);

        match op {
            FieldOp::Eq => Ok(field_value.matches(&Comparable::from(value))),
            FieldOp::Ne => Ok(!field_value.matches(&Comparable::from(value))),
            FieldOp::In => any_of(&field_value, value),
            FieldOp::Nin => Ok(!any_of(&field_value, value)?),
            FieldOp::Exists => Ok(found.is_some() == matches!(value, Bson::Boolean(true))),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                if found.is_none() {
                    return Ok(false);
                }

                let operand = Comparable::from(value);
                let candidates = match &field_value {
                    Comparable::Array(items) => items.iter().collect::<Vec<_>>(),
                    single => vec![single],
                };

                Ok(candidates.into_iter().any(|candidate| {
                    match candidate.partial_cmp(&operand) {
                        Some(ordering) => match op {
                            FieldOp::Gt => ordering == Ordering::Greater,
                            FieldOp::Gte => ordering != Ordering::Less,
                            FieldOp::Lt => ordering == Ordering::Less,
                            _ => ordering != Ordering::Greater,
                        },
                        None => false,
                    }
                }))
            },
            FieldOp::Regex => {
                let regex = self.pattern(field, value)?;

                Ok(match found {
                    Some(Bson::String(text)) => regex.is_match(text),
                    Some(Bson::Array(items)) => items
                        .iter()
                        .any(|item| matches!(item, Bson::String(text) if regex.is_match(text))),
                    _ => false,
                })
            },
        }
    }

    fn visit_raw(&mut self, raw: &Document) -> Result<Self::Output, Self::Error> {
        Err(ModelError::StoreFailure(format!(
            "operator not supported by the in-memory store: {raw}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmodel_core::query::Filter;

    fn eval(document: &Document, cond: &Cond) -> bool {
        DocumentEvaluator::new().evaluate(document, cond).unwrap()
    }

    #[test]
    fn missing_fields_compare_as_null() {
        let document = doc! { "name": "x" };

        assert!(eval(&document, &Filter::ne("IsDeleted", true)));
        assert!(eval(&document, &Filter::eq("IsDeleted", Bson::Null)));
        assert!(!eval(&document, &Filter::gt("age", 1)));
        assert!(!eval(&doc! { "IsDeleted": true }, &Filter::ne("IsDeleted", true)));
    }

    #[test]
    fn arrays_match_their_elements() {
        let id = ObjectId::new();
        let document = doc! { "tags": ["a", "b"], "owners": [id] };

        assert!(eval(&document, &Filter::eq("tags", "a")));
        assert!(eval(&document, &Filter::any_of("owners", [id])));
        assert!(eval(&document, &Filter::none_of("tags", ["c"])));
        assert!(!eval(&document, &Filter::ne("tags", "b")));
    }

    #[test]
    fn numbers_compare_across_widths() {
        let document = doc! { "age": 30i64 };

        assert!(eval(&document, &Filter::gte("age", 30)));
        assert!(eval(&document, &Filter::lt("age", 30.5)));
        assert!(!eval(&document, &Filter::gt("age", "29")));
    }

    #[test]
    fn regex_and_dotted_paths() {
        let document = doc! { "profile": { "name": "Alice" } };
        let cond = Cond::field(
            "profile.name",
            FieldOp::Regex,
            doc! { "$regex": "^al", "$options": "i" },
        );

        assert!(eval(&document, &cond));
        assert!(eval(&document, &Filter::exists("profile.name")));
        assert!(eval(&document, &Filter::not_exists("profile.age")));
    }

    #[test]
    fn raw_operators_are_rejected() {
        let raw = Cond::Raw(doc! { "$text": { "$search": "x" } });
        let result = DocumentEvaluator::new().evaluate(&doc! {}, &raw);
        assert!(matches!(result, Err(ModelError::StoreFailure(_))));
    }

    #[test]
    fn sort_order_ranks_types() {
        let null = Bson::Null;
        let number = Bson::Int32(5);
        let text = Bson::String("a".into());

        assert_eq!(Comparable::from(&null).sort_cmp(&Comparable::from(&number)), Ordering::Less);
        assert_eq!(Comparable::from(&text).sort_cmp(&Comparable::from(&number)), Ordering::Greater);
    }
}
