//! Storage layer: persisted entities with constraint enforcement.
//!
//! A [`PersistedEntity`] is the storage-side counterpart of an
//! [`EntitySchema`]: the same constraints, enforced again at the storage
//! boundary, plus an opaque unique identifier and automatic
//! creation/modification timestamps.
//!
//! The write path holds the collection lock across the constraint check and
//! the mutation. Request-time uniqueness pre-checks are advisory and may race
//! under concurrent writes; the check performed here, under the lock, is the
//! actual correctness guarantee.

pub mod registry;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::pipeline::{self, PipelineOutput, Stage};
use crate::schema::EntitySchema;
use crate::validation::check_field;

pub use registry::ModelRegistry;

/// A stored record: a flat JSON object with engine-owned `id`, `created_at`,
/// and `updated_at` fields alongside the schema fields.
pub type Document = Map<String, Value>;

/// Field name of the opaque record identifier.
pub const ID_FIELD: &str = "id";
/// Field name of the creation timestamp.
pub const CREATED_AT_FIELD: &str = "created_at";
/// Field name of the modification timestamp.
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Rejections raised at the storage boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique field `{field}` already has value `{value}`")]
    UniqueViolation { field: String, value: String },

    #[error("{field}: {message}")]
    ConstraintViolation { field: String, message: String },

    #[error("unknown entity `{0}`")]
    UnknownEntity(String),
}

/// Requested result ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortSpec {
    /// Reverse-chronological, the default for listings.
    NewestFirst,
    /// Order by a named field's value.
    Field { name: String, descending: bool },
}

/// One entity's document collection.
///
/// Created through [`ModelRegistry::get_or_create`]; cheap to share behind an
/// `Arc`, one lock per entity.
#[derive(Debug)]
pub struct PersistedEntity {
    name: String,
    schema: EntitySchema,
    docs: RwLock<Vec<Document>>,
}

impl PersistedEntity {
    pub(crate) fn new(schema: EntitySchema) -> Self {
        Self {
            name: schema.name().to_string(),
            schema,
            docs: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// Insert a record, stamping its identifier and timestamps.
    ///
    /// Every declared constraint is re-verified under the write lock, making
    /// this the authority of record even when a request validator has already
    /// approved the payload.
    ///
    /// # Errors
    ///
    /// [`StoreError::ConstraintViolation`] for missing required fields or
    /// type/pattern/length/range failures; [`StoreError::UniqueViolation`]
    /// for duplicate values on unique fields.
    pub async fn insert(&self, fields: Document) -> Result<Document, StoreError> {
        let mut docs = self.docs.write().await;
        let mut doc = self.checked_document(&fields)?;

        for (name, _) in self.schema.unique_fields() {
            if let Some(value) = doc.get(name) {
                if docs.iter().any(|existing| existing.get(name) == Some(value)) {
                    return Err(StoreError::UniqueViolation {
                        field: name.to_string(),
                        value: display_value(value),
                    });
                }
            }
        }

        let now = timestamp();
        doc.insert(ID_FIELD.to_string(), Value::String(Uuid::new_v4().to_string()));
        doc.insert(CREATED_AT_FIELD.to_string(), Value::String(now.clone()));
        doc.insert(UPDATED_AT_FIELD.to_string(), Value::String(now));

        docs.push(doc.clone());
        Ok(doc)
    }

    /// Apply a partial patch to the record with the given id, bumping
    /// `updated_at`. Returns `None` when no such record exists.
    ///
    /// # Errors
    ///
    /// Same constraint errors as [`PersistedEntity::insert`]; the uniqueness
    /// check excludes the record being updated.
    pub async fn update(&self, id: &str, patch: Document) -> Result<Option<Document>, StoreError> {
        let mut docs = self.docs.write().await;
        let Some(index) = docs
            .iter()
            .position(|doc| doc.get(ID_FIELD).and_then(Value::as_str) == Some(id))
        else {
            return Ok(None);
        };

        let mut checked = Map::new();
        for (name, value) in &patch {
            let Some(spec) = self.schema.get(name) else {
                continue;
            };
            let coerced = check_field(name, spec, value).map_err(|err| StoreError::ConstraintViolation {
                field: err.field,
                message: err.message,
            })?;
            checked.insert(name.clone(), coerced);
        }

        for (name, _) in self.schema.unique_fields() {
            if let Some(value) = checked.get(name) {
                let taken = docs.iter().enumerate().any(|(i, existing)| {
                    i != index && existing.get(name) == Some(value)
                });
                if taken {
                    return Err(StoreError::UniqueViolation {
                        field: name.to_string(),
                        value: display_value(value),
                    });
                }
            }
        }

        let doc = &mut docs[index];
        for (name, value) in checked {
            doc.insert(name, value);
        }
        doc.insert(UPDATED_AT_FIELD.to_string(), Value::String(timestamp()));
        Ok(Some(doc.clone()))
    }

    pub async fn find_by_id(&self, id: &str) -> Option<Document> {
        self.docs
            .read()
            .await
            .iter()
            .find(|doc| doc.get(ID_FIELD).and_then(Value::as_str) == Some(id))
            .cloned()
    }

    /// First record matching the filter, in insertion order.
    pub async fn find_one(&self, filter: &Document) -> Option<Document> {
        self.docs
            .read()
            .await
            .iter()
            .find(|doc| matches_filter(doc, filter))
            .cloned()
    }

    /// Filtered, sorted, paginated fetch.
    pub async fn find(
        &self,
        filter: &Document,
        sort: &SortSpec,
        skip: usize,
        limit: Option<usize>,
    ) -> Vec<Document> {
        let mut matched: Vec<Document> = self
            .docs
            .read()
            .await
            .iter()
            .filter(|doc| matches_filter(doc, filter))
            .cloned()
            .collect();

        order_documents(&mut matched, sort);

        let tail = matched.into_iter().skip(skip);
        match limit {
            Some(limit) => tail.take(limit).collect(),
            None => tail.collect(),
        }
    }

    /// Count records matching the filter. Independent of [`PersistedEntity::find`]:
    /// a concurrent writer may make the pair observe different snapshots.
    pub async fn count(&self, filter: &Document) -> usize {
        self.docs
            .read()
            .await
            .iter()
            .filter(|doc| matches_filter(doc, filter))
            .count()
    }

    /// Whether any record carries `value` for `field`, optionally excluding
    /// one record id. This is the advisory pre-check; the insert/update path
    /// re-verifies under the lock.
    pub async fn exists_with(&self, field: &str, value: &Value, exclude_id: Option<&str>) -> bool {
        self.docs.read().await.iter().any(|doc| {
            doc.get(field) == Some(value)
                && doc.get(ID_FIELD).and_then(Value::as_str) != exclude_id
        })
    }

    /// Delete by id; `true` when a record was removed.
    pub async fn delete_by_id(&self, id: &str) -> bool {
        let mut docs = self.docs.write().await;
        let before = docs.len();
        docs.retain(|doc| doc.get(ID_FIELD).and_then(Value::as_str) != Some(id));
        docs.len() < before
    }

    /// Delete every record whose id appears in `ids`; returns the number
    /// removed.
    pub async fn delete_many(&self, ids: &[String]) -> usize {
        let mut docs = self.docs.write().await;
        let before = docs.len();
        docs.retain(|doc| {
            doc.get(ID_FIELD)
                .and_then(Value::as_str)
                .is_none_or(|id| !ids.iter().any(|candidate| candidate == id))
        });
        before - docs.len()
    }

    /// Delete the whole collection; returns the number removed.
    pub async fn delete_all(&self) -> usize {
        let mut docs = self.docs.write().await;
        let removed = docs.len();
        docs.clear();
        removed
    }

    /// Run a shaping pipeline over a snapshot of the collection.
    pub async fn aggregate(&self, stages: &[Stage]) -> PipelineOutput {
        let snapshot: Vec<Document> = self.docs.read().await.clone();
        pipeline::execute(stages, snapshot)
    }

    /// Validate a payload against the schema, returning the coerced document
    /// containing only schema fields.
    fn checked_document(&self, fields: &Document) -> Result<Document, StoreError> {
        let mut doc = Map::new();
        for (name, spec) in self.schema.fields() {
            match fields.get(name) {
                Some(Value::Null) | None => {
                    if let Some(message) = &spec.required {
                        return Err(StoreError::ConstraintViolation {
                            field: name.to_string(),
                            message: message.clone(),
                        });
                    }
                }
                Some(value) => {
                    let coerced =
                        check_field(name, spec, value).map_err(|err| StoreError::ConstraintViolation {
                            field: err.field,
                            message: err.message,
                        })?;
                    doc.insert(name.to_string(), coerced);
                }
            }
        }
        Ok(doc)
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Equality filter matching. A scalar criterion matches on equality; an array
/// criterion matches when the document value is one of its elements.
#[must_use]
pub fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, criterion)| match criterion {
        Value::Array(candidates) => doc
            .get(key)
            .is_some_and(|value| candidates.contains(value)),
        criterion => doc.get(key) == Some(criterion),
    })
}

/// Order documents in place. `NewestFirst` relies on the collection's
/// insertion order, which makes it deterministic even for records created in
/// the same microsecond.
pub(crate) fn order_documents(docs: &mut Vec<Document>, sort: &SortSpec) {
    match sort {
        SortSpec::NewestFirst => docs.reverse(),
        SortSpec::Field { name, descending } => {
            docs.sort_by(|a, b| compare_values(a.get(name), b.get(name)));
            if *descending {
                docs.reverse();
            }
        }
    }
}

/// Total order over optional JSON values: absent sorts first, then by type
/// group, then by value.
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(a), Value::Number(b)) => a
                .as_f64()
                .unwrap_or(f64::NAN)
                .total_cmp(&b.as_f64().unwrap_or(f64::NAN)),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (a, b) => a.to_string().cmp(&b.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use serde_json::json;

    fn entity() -> PersistedEntity {
        PersistedEntity::new(
            EntitySchema::new("users")
                .field("email", FieldSpec::string().required("email is required").unique())
                .field("name", FieldSpec::string())
                .field("age", FieldSpec::number().range(0.0, 130.0)),
        )
    }

    fn payload(email: &str, name: &str) -> Document {
        json!({"email": email, "name": name})
            .as_object()
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn insert_stamps_id_and_timestamps() {
        let entity = entity();
        let doc = entity.insert(payload("a@b.c", "Ada")).await.unwrap();

        let id = doc.get(ID_FIELD).and_then(Value::as_str).unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert!(doc.contains_key(CREATED_AT_FIELD));
        assert_eq!(doc.get(CREATED_AT_FIELD), doc.get(UPDATED_AT_FIELD));
    }

    #[tokio::test]
    async fn insert_enforces_unique_under_lock() {
        let entity = entity();
        entity.insert(payload("a@b.c", "Ada")).await.unwrap();

        let err = entity.insert(payload("a@b.c", "Bob")).await.unwrap_err();
        match err {
            StoreError::UniqueViolation { field, value } => {
                assert_eq!(field, "email");
                assert_eq!(value, "a@b.c");
            }
            other => panic!("expected unique violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn insert_enforces_required_and_range() {
        let entity = entity();

        let err = entity
            .insert(json!({"name": "NoMail"}).as_object().unwrap().clone())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation { ref field, .. } if field == "email"));

        let err = entity
            .insert(json!({"email": "x@y.z", "age": 500}).as_object().unwrap().clone())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation { ref field, .. } if field == "age"));
    }

    #[tokio::test]
    async fn update_merges_partially_and_excludes_own_id() {
        let entity = entity();
        let doc = entity.insert(payload("a@b.c", "Ada")).await.unwrap();
        let id = doc.get(ID_FIELD).and_then(Value::as_str).unwrap().to_string();

        // Re-submitting its own unique value is not a conflict.
        let updated = entity
            .update(&id, payload("a@b.c", "Ada Lovelace"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.get("name"), Some(&json!("Ada Lovelace")));
        assert_eq!(updated.get("email"), Some(&json!("a@b.c")));

        // But another record's value is.
        entity.insert(payload("b@b.c", "Bob")).await.unwrap();
        let err = entity.update(&id, payload("b@b.c", "Ada")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn update_missing_id_is_none() {
        let entity = entity();
        let got = entity
            .update(&Uuid::new_v4().to_string(), payload("a@b.c", "Ada"))
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn find_sorts_and_paginates() {
        let entity = entity();
        for name in ["one", "two", "three", "four"] {
            entity
                .insert(payload(&format!("{name}@x.y"), name))
                .await
                .unwrap();
        }

        // Newest first: reverse insertion order.
        let docs = entity
            .find(&Map::new(), &SortSpec::NewestFirst, 0, Some(2))
            .await;
        assert_eq!(docs[0].get("name"), Some(&json!("four")));
        assert_eq!(docs[1].get("name"), Some(&json!("three")));

        // Field sort ascending, skip into the middle.
        let docs = entity
            .find(
                &Map::new(),
                &SortSpec::Field {
                    name: "name".into(),
                    descending: false,
                },
                1,
                Some(2),
            )
            .await;
        assert_eq!(docs[0].get("name"), Some(&json!("one")));
        assert_eq!(docs[1].get("name"), Some(&json!("three")));
    }

    #[tokio::test]
    async fn filter_scalar_and_id_list() {
        let entity = entity();
        let a = entity.insert(payload("a@x.y", "Ada")).await.unwrap();
        let b = entity.insert(payload("b@x.y", "Bob")).await.unwrap();
        entity.insert(payload("c@x.y", "Cid")).await.unwrap();

        let filter = json!({"name": "Bob"}).as_object().unwrap().clone();
        assert_eq!(entity.count(&filter).await, 1);

        let ids = json!({
            "id": [a.get(ID_FIELD).unwrap(), b.get(ID_FIELD).unwrap()]
        })
        .as_object()
        .unwrap()
        .clone();
        assert_eq!(entity.count(&ids).await, 2);
    }

    #[tokio::test]
    async fn delete_paths_report_counts() {
        let entity = entity();
        let doc = entity.insert(payload("a@x.y", "Ada")).await.unwrap();
        let id = doc.get(ID_FIELD).and_then(Value::as_str).unwrap().to_string();

        assert!(entity.delete_by_id(&id).await);
        assert!(!entity.delete_by_id(&id).await);

        entity.insert(payload("b@x.y", "Bob")).await.unwrap();
        entity.insert(payload("c@x.y", "Cid")).await.unwrap();
        assert_eq!(entity.delete_all().await, 2);
        assert_eq!(entity.delete_all().await, 0);
    }
}
