use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::collection::Collection;
use crate::errors::Result;
use crate::lazy::{dependency, skeletal, AssociationNames, LazyResolver};
use crate::reference::{Reference, PRIMARY_REF};
use crate::types::{AttrMap, AttrValue, FoundEntity, InventoryObject};

/// Options for [`LazyHandle::new`].
#[derive(Debug, Clone)]
pub struct LazyFindOptions {
    /// Key-set variant of the reference.
    pub ref_name: String,
    /// Attribute to project the found entity to. `None` resolves to the
    /// entity itself.
    pub key: Option<String>,
    /// Returned when the lookup or the projected attribute yields nothing.
    pub default: Value,
    /// Flatten lazy values nested in a secondary reference before loading.
    pub transform_nested_lazy_finds: bool,
}

impl Default for LazyFindOptions {
    fn default() -> Self {
        LazyFindOptions {
            ref_name: PRIMARY_REF.to_string(),
            key: None,
            default: Value::Null,
            transform_nested_lazy_finds: false,
        }
    }
}

/// A deferred lookup of an entity in one collection.
#[derive(Clone)]
pub struct LazyHandle {
    collection: Arc<dyn Collection>,
    reference: Reference,
    key: Option<String>,
    default: Value,
    transform_nested_lazy_finds: bool,
}

impl LazyHandle {
    /// Creates a handle for `data` in `collection`.
    ///
    /// A handle without projection key immediately asks the collection for
    /// a skeletal placeholder (see [`skeletal::skeletal_precreate`]). With a
    /// key the value has to come from a real lookup, so nothing is
    /// pre-created.
    pub fn new(collection: Arc<dyn Collection>, data: AttrMap, options: LazyFindOptions) -> Self {
        let reference = collection.build_reference(&data, &options.ref_name);
        let handle = Self {
            collection,
            reference,
            key: options.key,
            default: options.default,
            transform_nested_lazy_finds: options.transform_nested_lazy_finds,
        };

        if handle.key.is_none() {
            skeletal::skeletal_precreate(handle.collection.as_ref(), &handle.reference);
        }

        handle
    }

    pub fn collection(&self) -> &Arc<dyn Collection> {
        &self.collection
    }

    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn transform_nested_lazy_finds(&self) -> bool {
        self.transform_nested_lazy_finds
    }

    pub fn is_primary(&self) -> bool {
        self.reference.is_primary()
    }

    pub fn stringified_reference(&self) -> String {
        self.reference.stringified()
    }

    /// See [`dependency::is_dependency`]. Uses the default association names.
    pub fn is_dependency(&self) -> bool {
        dependency::is_dependency(self, &AssociationNames::default())
    }

    /// See [`dependency::is_transitive_dependency`]. Uses the default
    /// association names.
    pub fn is_transitive_dependency(&self) -> bool {
        dependency::is_transitive_dependency(self, &AssociationNames::default())
    }

    /// Flattens nested secondary-index lookups in the reference with the
    /// default nesting bound.
    pub fn transform_nested_secondary_indexes(&mut self) -> Result<()> {
        LazyResolver::default().transform_nested_secondary_indexes(self)
    }

    /// Resolves the handle with the default resolver settings. See
    /// [`LazyResolver::load`].
    pub fn load(&mut self, owner: Option<(&InventoryObject, &str)>) -> Result<AttrValue> {
        LazyResolver::default().load(self, owner)
    }

    pub(crate) fn replace_reference(&mut self, reference: Reference) {
        self.reference = reference;
    }

    /// Looks `reference` up in the target collection and projects the result.
    /// Never registers edges.
    pub(crate) fn load_with(&self, reference: &Reference) -> AttrValue {
        self.project(self.collection.find(reference))
    }

    /// Turns a lookup result into the handle's value: the entity itself
    /// without a key, otherwise the projected attribute or the default.
    pub(crate) fn project(&self, found: Option<FoundEntity>) -> AttrValue {
        let Some(key) = &self.key else {
            return found.map(AttrValue::Entity).unwrap_or_else(AttrValue::null);
        };

        found
            .and_then(|entity| entity.read(key))
            .filter(|value| !value.is_null())
            .unwrap_or_else(|| AttrValue::Value(self.default.clone()))
    }

    /// JSON form used in reports and inventory documents.
    pub fn to_json(&self) -> Value {
        let data: Map<String, Value> = self
            .reference
            .full_reference()
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        json!({
            "$lazy": {
                "collection": self.collection.name(),
                "ref": self.reference.ref_name(),
                "data": data,
                "key": self.key,
                "default": self.default,
                "transform_nested_lazy_finds": self.transform_nested_lazy_finds,
            }
        })
    }
}

impl fmt::Debug for LazyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyHandle")
            .field("collection", &self.collection.name())
            .field("reference", &self.reference)
            .field("key", &self.key)
            .field("default", &self.default)
            .field("transform_nested_lazy_finds", &self.transform_nested_lazy_finds)
            .finish()
    }
}

impl fmt::Display for LazyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection.name(), self.reference)?;
        if let Some(key) = &self.key {
            write!(f, ".{key}")?;
        }
        Ok(())
    }
}
