//! Relation handling around writes and reads.
//!
//! Before a save, nested documents under relation fields are persisted in their
//! own collection and replaced by their identifiers. After a find, the stored
//! identifiers are swapped back for the documents they reference.

use bson::{Bson, Document, oid::ObjectId};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;

use crate::{
    backend::{StoreBackend, StoreSession},
    document::{CREATED_BY, ID, document_id},
    error::{ModelError, ModelResult},
    identifier::normalize_identifier,
    model::Model,
    query::{Filter, FindQuery, Projection},
    schema::{Cardinality, Relation},
};

/// Replaces the values of relation fields in `document` by foreign keys.
///
/// A nested document without `_id` is created through the related model (its
/// own hooks and audit stamps run, on the same session, before the parent is
/// written) and replaced by the new identifier. A nested document with an `_id`
/// is a reference to an existing document. Strings are normalized. `actor`
/// becomes the `CreatedBy` of children that don't carry one.
pub(crate) fn resolve_before_save<'s, 'a: 's, B: StoreBackend>(
    model: &'s Model<'a, B>,
    session: &'s mut B::Session,
    document: &'s mut Document,
    actor: Option<Bson>,
) -> BoxFuture<'s, ModelResult<()>> {
    async move {
        let relations: Vec<(String, Relation)> = model
            .schema()
            .relations()
            .map(|(field, relation)| (field.to_string(), relation.clone()))
            .collect();

        for (field, relation) in relations {
            let Some(slot) = document.get_mut(&field) else {
                continue;
            };
            let target = model.related(&relation.target)?;

            let value = std::mem::replace(slot, Bson::Null);
            *slot = match (relation.cardinality, value) {
                (Cardinality::Many, Bson::Array(items)) => {
                    let mut keys = Vec::with_capacity(items.len());
                    for item in items {
                        keys.push(resolve_reference(&target, session, item, actor.as_ref()).await?);
                    }
                    Bson::Array(keys)
                }
                (_, value) => resolve_reference(&target, session, value, actor.as_ref()).await?,
            };
        }

        Ok(())
    }
    .boxed()
}

async fn resolve_reference<B: StoreBackend>(
    target: &Model<'_, B>,
    session: &mut B::Session,
    value: Bson,
    actor: Option<&Bson>,
) -> ModelResult<Bson> {
    let mut child = match value {
        Bson::Document(child) => child,
        other => return normalize_identifier(other),
    };

    match child.get(ID) {
        None | Some(Bson::Null) => {}
        Some(id) => return normalize_identifier(id.clone()),
    }

    if let Some(actor) = actor
        && !child.contains_key(CREATED_BY)
    {
        child.insert(CREATED_BY, actor.clone());
    }

    tracing::debug!(
        model = %target.name(),
        collection = %target.collection(),
        "creating nested document"
    );

    target
        .create_in(session, vec![child])
        .await?
        .into_iter()
        .next()
        .and_then(|created| created.get(ID).cloned())
        .ok_or_else(|| {
            ModelError::StoreFailure(format!("nested {} was not created", target.name()))
        })
}

/// Inlines the documents referenced by relation fields of `documents`.
///
/// Fields excluded by `projection` are left alone. Referents are fetched with
/// one query per relation across the whole result set. A dangling key of a
/// `One` relation becomes `null`; dangling entries of a `Many` relation are
/// dropped.
pub(crate) async fn join_documents<B: StoreBackend>(
    model: &Model<'_, B>,
    session: &mut B::Session,
    documents: &mut [Document],
    projection: Option<&Projection>,
) -> ModelResult<()> {
    let relations: Vec<(String, Relation)> = model
        .schema()
        .relations()
        .filter(|(field, _)| projection.is_none_or(|projection| projection.allows(field)))
        .map(|(field, relation)| (field.to_string(), relation.clone()))
        .collect();

    for (field, relation) in relations {
        let keys = foreign_keys(documents, &field);
        if keys.is_empty() {
            continue;
        }

        let target = model.related(&relation.target)?;
        let referents: HashMap<ObjectId, Document> = session
            .find(target.collection(), FindQuery::new(Filter::any_of(ID, keys)))
            .await?
            .into_iter()
            .filter_map(|referent| document_id(&referent).map(|id| (id, referent)))
            .collect();

        tracing::debug!(
            model = %model.name(),
            field = %field,
            target = %target.name(),
            found = referents.len(),
            "joined relation"
        );

        for document in documents.iter_mut() {
            let Some(slot) = document.get_mut(&field) else {
                continue;
            };

            match relation.cardinality {
                Cardinality::One => {
                    if let Bson::ObjectId(id) = *slot {
                        *slot = referents.get(&id).cloned().map_or(Bson::Null, Bson::Document);
                    }
                }
                Cardinality::Many => {
                    if let Bson::Array(items) = slot {
                        let joined = items
                            .iter()
                            .filter_map(|item| match item {
                                Bson::ObjectId(id) => {
                                    referents.get(id).cloned().map(Bson::Document)
                                }
                                other => Some(other.clone()),
                            })
                            .collect();
                        *items = joined;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Distinct identifiers stored under `field`, in first-seen order.
fn foreign_keys(documents: &[Document], field: &str) -> Vec<ObjectId> {
    let mut keys = Vec::new();

    let values = documents.iter().filter_map(|document| document.get(field));
    for value in values {
        let ids: Box<dyn Iterator<Item = &Bson>> = match value {
            Bson::Array(items) => Box::new(items.iter()),
            single => Box::new(std::iter::once(single)),
        };
        for id in ids {
            if let Bson::ObjectId(id) = id
                && !keys.contains(id)
            {
                keys.push(*id);
            }
        }
    }

    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn collects_distinct_keys_in_order() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let documents = vec![
            doc! { "org": a },
            doc! { "org": b },
            doc! { "org": a },
            doc! { "org": null },
            doc! { "name": "no org" },
        ];

        assert_eq!(foreign_keys(&documents, "org"), vec![a, b]);
    }

    #[test]
    fn collects_keys_from_arrays() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let documents = vec![doc! { "groups": [a, b] }, doc! { "groups": [b, "stray"] }];

        assert_eq!(foreign_keys(&documents, "groups"), vec![a, b]);
    }
}
