//! Normalized entity store and the cache policy engine.
//!
//! Entities are keyed by type name plus the values of that type's declared
//! key fields, so two payloads describing the same real-world object land in
//! one record regardless of which query produced them. Reads go through the
//! registered field policies; writes go through merge policies with
//! incoming-replaces-existing as the default.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::policy::{FieldPolicy, MergeContext, ReadContext};

/// Implicit identity field for types with no declared key fields.
const DEFAULT_KEY_FIELD: &str = "id";

/// Composite normalization key: type name plus joined key-field values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    type_name: String,
    id: String,
}

impl EntityKey {
    /// Create a key from a type name and a joined identity string.
    #[must_use]
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }

    /// Entity type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Joined key-field values.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.id)
    }
}

/// Outcome of a field read.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldReading {
    /// A stored or policy-computed value.
    Value(Value),
    /// Nothing stored and no policy computes the field.
    Absent,
    /// A read policy failed; the field is unavailable, the entity is not.
    Unavailable,
}

impl FieldReading {
    /// Unwrap the value, if any.
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Absent | Self::Unavailable => None,
        }
    }

    /// Whether this reading carries a value.
    #[must_use]
    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }
}

type Entity = Map<String, Value>;

/// Registry of key fields and field policies plus the normalized store.
///
/// Reads are concurrent; writes are serialized, which is strictly stronger
/// than the required per-entity atomicity. Policy functions run under the
/// store lock and must be pure.
#[derive(Debug, Default)]
pub struct CacheEngine {
    key_fields: RwLock<HashMap<String, Vec<String>>>,
    policies: RwLock<HashMap<String, HashMap<String, FieldPolicy>>>,
    entities: RwLock<HashMap<EntityKey, Entity>>,
}

impl CacheEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare which fields determine identity for `type_name`.
    ///
    /// Must be called before any entity of that type is normalized,
    /// otherwise identity is inconsistent across writes. Types with no
    /// declaration fall back to the implicit `id` field.
    pub fn register_key_fields(
        &self,
        type_name: impl Into<String>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) {
        self.key_fields
            .write()
            .insert(type_name.into(), fields.into_iter().map(Into::into).collect());
    }

    /// Install a field policy for `(type_name, field)`.
    ///
    /// Types are created lazily; registering for a type the store has never
    /// seen is not an error. Registering a second policy of a disjoint kind
    /// folds the two together.
    pub fn register_field_policy(
        &self,
        type_name: impl Into<String>,
        field: impl Into<String>,
        policy: FieldPolicy,
    ) {
        let mut policies = self.policies.write();
        let fields = policies.entry(type_name.into()).or_default();
        let entry = fields.entry(field.into());
        match entry {
            std::collections::hash_map::Entry::Occupied(mut existing) => {
                let folded = existing.get().clone().fold(policy);
                existing.insert(folded);
            }
            std::collections::hash_map::Entry::Vacant(vacant) => {
                vacant.insert(policy);
            }
        }
    }

    /// Normalize one object payload into the store.
    ///
    /// Each field is combined with any existing stored value through its
    /// merge policy; fields without a policy are replaced. A failing merge
    /// policy leaves the existing value in place and the remaining fields
    /// are still written.
    pub fn write(
        &self,
        type_name: &str,
        payload: &Value,
        variables: &Value,
    ) -> Result<EntityKey, CacheError> {
        let Some(fields) = payload.as_object() else {
            return Err(CacheError::NotAnObject {
                type_name: type_name.to_owned(),
            });
        };
        let key = self.entity_key(type_name, fields)?;

        let policies = self.policies.read();
        let type_policies = policies.get(type_name);
        let merge_ctx = MergeContext::new(variables);

        let mut entities = self.entities.write();
        let entity = entities.entry(key.clone()).or_default();
        for (name, incoming) in fields {
            let merge = type_policies
                .and_then(|fields| fields.get(name))
                .and_then(FieldPolicy::merge_fn);
            let merged = match merge {
                Some(merge) => match merge(entity.get(name), incoming, &merge_ctx) {
                    Ok(value) => value,
                    Err(err) => {
                        warn!(
                            entity = %key,
                            field = name.as_str(),
                            error = %err,
                            "merge policy failed, keeping stored value"
                        );
                        continue;
                    }
                },
                None => incoming.clone(),
            };
            entity.insert(name.clone(), merged);
        }
        debug!(entity = %key, fields = fields.len(), "normalized entity");
        Ok(key)
    }

    /// Normalize every identifiable entity in a response tree.
    ///
    /// Objects carrying `__typename` (and their key fields) are written via
    /// [`CacheEngine::write`]; nested objects and arrays are visited
    /// recursively. Unidentifiable objects are skipped, not errors.
    pub fn write_document(&self, data: &Value, variables: &Value) -> Vec<EntityKey> {
        let mut keys = Vec::new();
        self.collect_entities(data, variables, &mut keys);
        keys
    }

    fn collect_entities(&self, value: &Value, variables: &Value, keys: &mut Vec<EntityKey>) {
        match value {
            Value::Object(fields) => {
                for child in fields.values() {
                    self.collect_entities(child, variables, keys);
                }
                if let Some(type_name) = fields.get("__typename").and_then(Value::as_str) {
                    match self.write(type_name, value, variables) {
                        Ok(key) => keys.push(key),
                        Err(err) => {
                            debug!(type_name, error = %err, "skipping unidentifiable entity");
                        }
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.collect_entities(item, variables, keys);
                }
            }
            _ => {}
        }
    }

    /// Read one field of one entity.
    ///
    /// A registered read policy is invoked with the stored value, the
    /// operation variables, and a sibling-field accessor; without a policy
    /// the stored value is returned directly. Reads are pure with respect to
    /// store state and variables.
    pub fn read(&self, type_name: &str, id: &str, field: &str, variables: &Value) -> FieldReading {
        // Same lock order as write: policies, then entities.
        let policies = self.policies.read();
        let read = policies
            .get(type_name)
            .and_then(|fields| fields.get(field))
            .and_then(FieldPolicy::read_fn);

        let entities = self.entities.read();
        let entity = entities.get(&EntityKey::new(type_name, id));
        let stored = entity.and_then(|entity| entity.get(field));

        match read {
            Some(read) => {
                let lookup = |name: &str| entity.and_then(|entity| entity.get(name)).cloned();
                let ctx = ReadContext::new(variables, &lookup);
                match read(stored, &ctx) {
                    Ok(value) => FieldReading::Value(value),
                    Err(err) => {
                        warn!(
                            type_name,
                            id,
                            field,
                            error = %err,
                            "read policy failed"
                        );
                        FieldReading::Unavailable
                    }
                }
            }
            None => stored
                .cloned()
                .map_or(FieldReading::Absent, FieldReading::Value),
        }
    }

    /// Remove one entity from the store.
    ///
    /// Returns whether an entity was present.
    pub fn evict(&self, type_name: &str, id: &str) -> bool {
        self.entities
            .write()
            .remove(&EntityKey::new(type_name, id))
            .is_some()
    }

    /// Drop every stored entity. Registrations survive.
    pub fn clear(&self) {
        self.entities.write().clear();
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    fn entity_key(&self, type_name: &str, fields: &Entity) -> Result<EntityKey, CacheError> {
        let declared = self.key_fields.read();
        let implicit = [DEFAULT_KEY_FIELD.to_owned()];
        let names: &[String] = declared.get(type_name).map_or(&implicit, Vec::as_slice);

        let mut parts = Vec::with_capacity(names.len());
        for name in names {
            let value = fields
                .get(name)
                .ok_or_else(|| CacheError::MissingKeyField {
                    type_name: type_name.to_owned(),
                    field: name.clone(),
                })?;
            parts.push(key_part(value));
        }
        Ok(EntityKey::new(type_name, parts.join(":")))
    }
}

fn key_part(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_key_field_is_id() {
        let engine = CacheEngine::new();
        let key = engine
            .write("User", &json!({ "id": "u1", "name": "Ada" }), &Value::Null)
            .expect("write");
        assert_eq!(key, EntityKey::new("User", "u1"));
    }

    #[test]
    fn declared_key_fields_override_default() {
        let engine = CacheEngine::new();
        engine.register_key_fields("RestaurantPreview", ["_id"]);
        let key = engine
            .write(
                "RestaurantPreview",
                &json!({ "_id": "abc123", "name": "Trattoria" }),
                &Value::Null,
            )
            .expect("write");
        assert_eq!(key, EntityKey::new("RestaurantPreview", "abc123"));
    }

    #[test]
    fn composite_key_joins_declared_fields() {
        let engine = CacheEngine::new();
        engine.register_key_fields("Seat", ["row", "number"]);
        let key = engine
            .write("Seat", &json!({ "row": "A", "number": 7 }), &Value::Null)
            .expect("write");
        assert_eq!(key.id(), "A:7");
    }

    #[test]
    fn missing_key_field_is_an_error() {
        let engine = CacheEngine::new();
        let err = engine
            .write("User", &json!({ "name": "no id" }), &Value::Null)
            .expect_err("should fail");
        assert_eq!(
            err,
            CacheError::MissingKeyField {
                type_name: "User".into(),
                field: "id".into(),
            }
        );
    }

    #[test]
    fn non_object_payload_is_an_error() {
        let engine = CacheEngine::new();
        let err = engine
            .write("User", &json!([1, 2]), &Value::Null)
            .expect_err("should fail");
        assert_eq!(
            err,
            CacheError::NotAnObject {
                type_name: "User".into(),
            }
        );
    }

    #[test]
    fn read_without_policy_returns_stored_value() {
        let engine = CacheEngine::new();
        engine
            .write("User", &json!({ "id": "u1", "name": "Ada" }), &Value::Null)
            .expect("write");
        assert_eq!(
            engine.read("User", "u1", "name", &Value::Null),
            FieldReading::Value(json!("Ada"))
        );
        assert_eq!(
            engine.read("User", "u1", "missing", &Value::Null),
            FieldReading::Absent
        );
        assert_eq!(
            engine.read("User", "nobody", "name", &Value::Null),
            FieldReading::Absent
        );
    }

    #[test]
    fn failing_read_policy_is_unavailable_not_fatal() {
        let engine = CacheEngine::new();
        engine.register_field_policy(
            "User",
            "derived",
            FieldPolicy::read(|_, _| Err(crate::PolicyError::new("boom"))),
        );
        engine
            .write("User", &json!({ "id": "u1", "name": "Ada" }), &Value::Null)
            .expect("write");

        assert_eq!(
            engine.read("User", "u1", "derived", &Value::Null),
            FieldReading::Unavailable
        );
        // Other fields keep serving normally.
        assert_eq!(
            engine.read("User", "u1", "name", &Value::Null),
            FieldReading::Value(json!("Ada"))
        );
    }

    #[test]
    fn failing_merge_policy_keeps_stored_value() {
        let engine = CacheEngine::new();
        engine.register_field_policy(
            "User",
            "scores",
            FieldPolicy::merge(|_, _, _| Err(crate::PolicyError::new("boom"))),
        );
        engine
            .write("User", &json!({ "id": "u1" }), &Value::Null)
            .expect("write");
        // First write of the field fails its merge; nothing is stored.
        engine
            .write("User", &json!({ "id": "u1", "scores": [1] }), &Value::Null)
            .expect("write");
        assert_eq!(
            engine.read("User", "u1", "scores", &Value::Null),
            FieldReading::Absent
        );
    }

    #[test]
    fn evict_then_rewrite_restores_entity() {
        let engine = CacheEngine::new();
        let payload = json!({ "id": "u1", "name": "Ada" });
        engine.write("User", &payload, &Value::Null).expect("write");
        assert!(engine.evict("User", "u1"));
        assert!(!engine.evict("User", "u1"));
        assert!(engine.is_empty());
        engine.write("User", &payload, &Value::Null).expect("write");
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn write_document_normalizes_nested_entities() {
        let engine = CacheEngine::new();
        engine.register_key_fields("RestaurantPreview", ["_id"]);
        let data = json!({
            "restaurants": [
                {
                    "__typename": "RestaurantPreview",
                    "_id": "r1",
                    "owner": { "__typename": "User", "id": "u1" }
                },
                { "__typename": "RestaurantPreview", "_id": "r2" },
                { "name": "no typename, skipped" }
            ]
        });
        let keys = engine.write_document(&data, &Value::Null);
        assert_eq!(keys.len(), 3);
        assert_eq!(engine.len(), 3);
        assert!(engine
            .read("User", "u1", "id", &Value::Null)
            .is_value());
    }
}
