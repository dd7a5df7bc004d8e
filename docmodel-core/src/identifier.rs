//! Rewriting identifier-shaped values into native [`ObjectId`]s.
//!
//! Callers address documents with hex strings (from URLs, JSON bodies, forms)
//! while the store keys them by `ObjectId`. Every condition that reaches a store
//! goes through [`normalize_condition`] first, so `{"_id": "65f0..."}`,
//! `{"_id": {"$in": [...]}}` and the same shapes nested in `$and`/`$or` groups
//! all compare against native identifiers.

use bson::{Bson, oid::ObjectId};

use crate::{
    error::{ModelError, ModelResult},
    query::{Cond, FieldOp},
};

/// Parses a hex string into a native identifier.
///
/// # Errors
///
/// Returns [`ModelError::MalformedIdentifier`] if the string is not a valid identifier.
pub fn parse_identifier(value: &str) -> ModelResult<ObjectId> {
    ObjectId::parse_str(value.trim())
        .map_err(|_| ModelError::MalformedIdentifier(value.to_string()))
}

/// Normalizes one identifier-shaped value.
///
/// Strings become `ObjectId`s, `ObjectId`s pass through unchanged, arrays are
/// normalized element-wise in order, and any other value is returned untouched.
///
/// # Errors
///
/// Returns [`ModelError::MalformedIdentifier`] for strings that don't parse.
pub fn normalize_identifier(value: Bson) -> ModelResult<Bson> {
    match value {
        Bson::String(hex) => Ok(Bson::ObjectId(parse_identifier(&hex)?)),
        Bson::Array(items) => Ok(Bson::Array(
            items
                .into_iter()
                .map(normalize_identifier)
                .collect::<ModelResult<Vec<_>>>()?,
        )),
        other => Ok(other),
    }
}

/// Rewrites every predicate that addresses one of `id_fields` so its operand
/// holds native identifiers.
///
/// Recurses through `And`/`Or` groups at any depth. Operators that do not
/// compare identities (`$exists`, `$regex`, `$gt`...) and raw passthrough
/// operators are left alone.
///
/// # Errors
///
/// Returns [`ModelError::MalformedIdentifier`] on the first unparsable identifier.
pub fn normalize_condition<S: AsRef<str>>(cond: Cond, id_fields: &[S]) -> ModelResult<Cond> {
    match cond {
        Cond::And(children) => Ok(Cond::And(normalize_children(children, id_fields)?)),
        Cond::Or(children) => Ok(Cond::Or(normalize_children(children, id_fields)?)),
        Cond::Field { field, op, value }
            if id_fields.iter().any(|id_field| id_field.as_ref() == field) =>
        {
            let value = match op {
                FieldOp::Eq | FieldOp::Ne | FieldOp::In | FieldOp::Nin => {
                    normalize_identifier(value)?
                }
                _ => value,
            };

            Ok(Cond::Field { field, op, value })
        }
        other => Ok(other),
    }
}

fn normalize_children<S: AsRef<str>>(
    children: Vec<Cond>,
    id_fields: &[S],
) -> ModelResult<Vec<Cond>> {
    children
        .into_iter()
        .map(|child| normalize_condition(child, id_fields))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Filter;
    use bson::doc;
    use pretty_assertions::assert_eq;

    const HEX_A: &str = "65f0c0ffee0000000000000a";
    const HEX_B: &str = "65f0c0ffee0000000000000b";

    #[test]
    fn native_identifiers_are_unchanged() {
        let id = ObjectId::new();
        assert_eq!(normalize_identifier(Bson::ObjectId(id)).unwrap(), Bson::ObjectId(id));
    }

    #[test]
    fn in_lists_keep_order() {
        let cond = Cond::from_document(&doc! { "_id": { "$in": [HEX_A, HEX_B] } }).unwrap();
        let normalized = normalize_condition(cond, &["_id"]).unwrap();

        assert_eq!(
            normalized,
            Filter::any_of(
                "_id",
                [parse_identifier(HEX_A).unwrap(), parse_identifier(HEX_B).unwrap()]
            )
        );
    }

    #[test]
    fn recurses_into_boolean_groups() {
        let cond = Cond::from_document(&doc! {
            "$or": [ { "_id": HEX_A }, { "$and": [ { "owner": HEX_B }, { "name": HEX_B } ] } ]
        })
        .unwrap();
        let normalized = normalize_condition(cond, &["_id", "owner"]).unwrap();

        let rendered = normalized.to_document().unwrap();
        assert_eq!(
            rendered,
            doc! {
                "$or": [
                    { "_id": parse_identifier(HEX_A).unwrap() },
                    { "owner": parse_identifier(HEX_B).unwrap(), "name": HEX_B },
                ]
            }
        );
    }

    #[test]
    fn malformed_identifiers_fail() {
        let cond = Cond::from_document(&doc! { "$and": [ { "_id": "nope" } ] }).unwrap();
        assert!(matches!(
            normalize_condition(cond, &["_id"]),
            Err(ModelError::MalformedIdentifier(value)) if value == "nope"
        ));
    }

    #[test]
    fn non_identifier_operators_are_untouched() {
        let cond = Filter::exists("_id");
        assert_eq!(normalize_condition(cond.clone(), &["_id"]).unwrap(), cond);
    }
}
