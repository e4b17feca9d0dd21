//! Explicit model registry.
//!
//! The registry is owned by the application bootstrap and passed into the
//! engine; there is no ambient process-wide state. Registration idempotency
//! is an explicit contract: [`ModelRegistry::get_or_create`] returns the
//! previously registered entity when route wiring references the same name
//! from multiple configuration sources.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::{Document, PersistedEntity};
use crate::schema::{EntitySchema, FieldKind};

/// Registry of persisted entities, keyed by entity name.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    // Mutated only during startup registration; request handling takes
    // read access and never holds the guard across an await.
    entities: RwLock<HashMap<String, Arc<PersistedEntity>>>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the entity for `schema.name()`, or return the existing one.
    ///
    /// The first registration under a name wins; a later call with a
    /// different schema for the same name gets the original definition.
    pub fn get_or_create(&self, schema: EntitySchema) -> Arc<PersistedEntity> {
        let name = schema.name().to_string();
        let mut entities = self.entities.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        entities
            .entry(name)
            .or_insert_with(|| Arc::new(PersistedEntity::new(schema)))
            .clone()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<PersistedEntity>> {
        self.entities
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Resolve reference fields to their target records.
    ///
    /// Each `Reference` field holding an identifier is replaced by the target
    /// record as a nested object. Dangling references and unregistered
    /// targets are left as plain identifiers.
    pub async fn populate(&self, schema: &EntitySchema, docs: &mut [Document]) {
        for (field, spec) in schema.fields() {
            if spec.kind != FieldKind::Reference {
                continue;
            }
            let Some(target) = spec.reference_target.as_deref().and_then(|name| self.get(name))
            else {
                continue;
            };
            for doc in docs.iter_mut() {
                let Some(id) = doc.get(field).and_then(Value::as_str).map(ToString::to_string)
                else {
                    continue;
                };
                if let Some(referenced) = target.find_by_id(&id).await {
                    doc.insert(field.to_string(), Value::Object(referenced));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use crate::store::ID_FIELD;
    use serde_json::json;

    #[test]
    fn registration_is_idempotent_per_name() {
        let registry = ModelRegistry::new();
        let first = registry.get_or_create(EntitySchema::new("users").field("a", FieldSpec::string()));
        let second = registry.get_or_create(EntitySchema::new("users").field("b", FieldSpec::number()));

        assert!(Arc::ptr_eq(&first, &second));
        // First registration wins: the original schema is kept.
        assert!(second.schema().get("a").is_some());
        assert!(second.schema().get("b").is_none());
    }

    #[test]
    fn distinct_names_get_distinct_entities() {
        let registry = ModelRegistry::new();
        let users = registry.get_or_create(EntitySchema::new("users"));
        let posts = registry.get_or_create(EntitySchema::new("posts"));
        assert!(!Arc::ptr_eq(&users, &posts));
        assert!(registry.get("users").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn populate_resolves_references() {
        let registry = ModelRegistry::new();
        let authors = registry.get_or_create(
            EntitySchema::new("authors").field("name", FieldSpec::string().required("name is required")),
        );
        registry.get_or_create(
            EntitySchema::new("posts")
                .field("title", FieldSpec::string())
                .field("author", FieldSpec::reference("authors")),
        );

        let ada = authors
            .insert(json!({"name": "Ada"}).as_object().unwrap().clone())
            .await
            .unwrap();
        let ada_id = ada.get(ID_FIELD).unwrap().clone();

        let posts_schema = registry.get("posts").unwrap().schema().clone();
        let mut docs = vec![json!({"title": "Hello", "author": ada_id})
            .as_object()
            .unwrap()
            .clone()];
        registry.populate(&posts_schema, &mut docs).await;

        let author = docs[0].get("author").unwrap();
        assert!(author.is_object());
        assert_eq!(author["name"], "Ada");
    }

    #[tokio::test]
    async fn populate_leaves_dangling_references() {
        let registry = ModelRegistry::new();
        registry.get_or_create(EntitySchema::new("authors"));
        let schema = EntitySchema::new("posts").field("author", FieldSpec::reference("authors"));

        let ghost = uuid::Uuid::new_v4().to_string();
        let mut docs = vec![json!({"author": ghost}).as_object().unwrap().clone()];
        registry.populate(&schema, &mut docs).await;

        assert_eq!(docs[0]["author"], json!(ghost));
    }
}
