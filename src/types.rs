use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::lazy::LazyHandle;
use crate::reference::{value_fragment, Reference};

/// Attribute values keyed by attribute name.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// A value held by an entity under construction or by a reference.
///
/// Ingestion data mixes concrete values with deferred lookups, and a
/// resolved lookup may hand back a whole entity instead of a value.
#[derive(Debug, Clone)]
pub enum AttrValue {
    Value(Value),
    Lazy(Box<LazyHandle>),
    Entity(FoundEntity),
}

impl AttrValue {
    /// The `null` value.
    pub fn null() -> Self {
        AttrValue::Value(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Value(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            AttrValue::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_lazy(&self) -> Option<&LazyHandle> {
        match self {
            AttrValue::Lazy(lazy) => Some(lazy),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&FoundEntity> {
        match self {
            AttrValue::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Renders this value as one fragment of a stringified reference.
    ///
    /// Lazy handles and entities render as the identity of their target, so
    /// a key holding a relation matches whether the relation has been
    /// resolved yet or not.
    pub fn index_fragment(&self) -> String {
        match self {
            AttrValue::Value(v) => value_fragment(v),
            AttrValue::Lazy(lazy) => lazy.reference().stringified(),
            AttrValue::Entity(entity) => entity.identity(),
        }
    }

    /// Converts this value to JSON for reports.
    pub fn to_json(&self) -> Value {
        match self {
            AttrValue::Value(v) => v.clone(),
            AttrValue::Lazy(lazy) => lazy.to_json(),
            AttrValue::Entity(entity) => entity.to_json(),
        }
    }
}

impl From<Value> for AttrValue {
    fn from(value: Value) -> Self {
        AttrValue::Value(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Value(Value::String(value.to_string()))
    }
}

impl From<LazyHandle> for AttrValue {
    fn from(lazy: LazyHandle) -> Self {
        AttrValue::Lazy(Box::new(lazy))
    }
}

impl From<FoundEntity> for AttrValue {
    fn from(entity: FoundEntity) -> Self {
        AttrValue::Entity(entity)
    }
}

/// Builds an [`AttrMap`] from concrete JSON values.
pub fn attr_map<K, I>(pairs: I) -> AttrMap
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), AttrValue::Value(v)))
        .collect()
}

/// Read access to an entity that already exists in the persistent store.
pub trait Entity: fmt::Debug + Send + Sync {
    /// Returns the attribute `name`, or `None` when the entity has no such
    /// attribute.
    fn attribute(&self, name: &str) -> Option<Value>;
}

/// A row loaded from the persistent store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub attributes: Map<String, Value>,
}

impl PersistedRecord {
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self { attributes }
    }
}

impl Entity for PersistedRecord {
    fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.get(name).cloned()
    }
}

/// An entity returned by a collection lookup.
#[derive(Debug, Clone)]
pub enum FoundEntity {
    /// Built during this run and not saved yet, skeletal placeholders
    /// included. Its attributes live in the construction data bag.
    Unsaved(Arc<InventoryObject>),
    /// Loaded from the persistent store. Its attributes are read directly.
    Persisted(Arc<dyn Entity>),
}

impl FoundEntity {
    /// Reads the attribute `key`, from the data bag for unsaved entities and
    /// from the record for persisted ones.
    pub fn read(&self, key: &str) -> Option<AttrValue> {
        match self {
            FoundEntity::Unsaved(object) => object.get(key).cloned(),
            FoundEntity::Persisted(record) => record.attribute(key).map(AttrValue::Value),
        }
    }

    /// Identity used when this entity appears inside another reference: the
    /// stringified primary reference for unsaved entities, the `id` column
    /// for persisted ones.
    pub fn identity(&self) -> String {
        match self {
            FoundEntity::Unsaved(object) => object.manager_uuid(),
            FoundEntity::Persisted(record) => record
                .attribute("id")
                .map(|id| value_fragment(&id))
                .unwrap_or_default(),
        }
    }

    pub fn as_unsaved(&self) -> Option<&Arc<InventoryObject>> {
        match self {
            FoundEntity::Unsaved(object) => Some(object),
            FoundEntity::Persisted(_) => None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, FoundEntity::Persisted(_))
    }

    pub fn to_json(&self) -> Value {
        match self {
            FoundEntity::Unsaved(object) => json!({
                "$entity": {
                    "collection": object.collection_name(),
                    "manager_uuid": object.manager_uuid(),
                }
            }),
            FoundEntity::Persisted(record) => json!({
                "$record": { "id": record.attribute("id").unwrap_or(Value::Null) }
            }),
        }
    }
}

/// An entity under construction: the owning collection, its primary
/// reference and the attributes gathered for it so far.
#[derive(Debug, Clone)]
pub struct InventoryObject {
    collection: String,
    reference: Reference,
    data: AttrMap,
}

impl InventoryObject {
    pub fn new(collection: impl Into<String>, reference: Reference, data: AttrMap) -> Self {
        Self {
            collection: collection.into(),
            reference,
            data,
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// The construction data bag.
    pub fn data(&self) -> &AttrMap {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.data.get(key)
    }

    /// Stringified primary reference; stable across skeletal and full builds.
    pub fn manager_uuid(&self) -> String {
        self.reference.stringified()
    }

    pub fn identity(&self) -> EntityKey {
        EntityKey {
            collection: self.collection.clone(),
            manager_uuid: self.manager_uuid(),
        }
    }

    /// Returns a copy with `data` laid over the current data bag. The
    /// reference is kept as is.
    pub fn merged(&self, data: AttrMap) -> Self {
        let mut merged = self.data.clone();
        merged.extend(data);
        Self {
            collection: self.collection.clone(),
            reference: self.reference.clone(),
            data: merged,
        }
    }
}

/// Collection name plus stringified primary reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub collection: String,
    pub manager_uuid: String,
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.manager_uuid)
    }
}

/// A relationship that could not be resolved when it was looked up. A later
/// repair pass retries `lazy` and writes the result to `attribute` of the
/// owner.
#[derive(Debug, Clone)]
pub struct UnconnectedEdge {
    pub owner: EntityKey,
    pub attribute: String,
    pub lazy: LazyHandle,
}
