//! JSON inventory documents.
//!
//! A document lists collections with their key sets, records already in the
//! persistent store and the objects to ingest. Attribute values of the form
//! `{"$lazy": {...}}` become [`LazyHandle`]s, so a document describes the
//! same deferred relationships an ingestion run builds in code.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collection::{Collection, CollectionSpec, InMemoryCollection};
use crate::errors::{InventoryError, Result};
use crate::lazy::{DependencyScan, LazyFindOptions, LazyHandle, LazyResolver};
use crate::reference::PRIMARY_REF;
use crate::types::{AttrMap, AttrValue, EntityKey, PersistedRecord, UnconnectedEdge};

/// Object key marking a lazy value in a document.
pub const LAZY_TAG: &str = "$lazy";

/// Source label used for documents that did not come from a file.
const INLINE_SOURCE: &str = "<inline>";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryDocument {
    #[serde(default)]
    pub collections: Vec<CollectionDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDocument {
    #[serde(flatten)]
    pub spec: CollectionSpec,
    /// Rows already in the persistent store.
    #[serde(default)]
    pub persisted: Vec<Map<String, Value>>,
    /// Objects to build, in order.
    #[serde(default)]
    pub objects: Vec<Map<String, Value>>,
}

/// Body of a `$lazy` value.
#[derive(Debug, Deserialize)]
struct LazySpec {
    collection: String,
    #[serde(rename = "ref", default = "primary_ref")]
    ref_name: String,
    data: Value,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    default: Value,
    #[serde(default)]
    transform_nested_lazy_finds: bool,
}

fn primary_ref() -> String {
    PRIMARY_REF.to_string()
}

/// Collections built from a document.
pub struct Inventory {
    collections: Vec<Arc<InMemoryCollection>>,
    source: String,
}

/// Outcome of resolving every object of an inventory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveReport {
    pub objects: Vec<ResolvedObject>,
    /// Skeletal placeholders that never received full data.
    pub placeholders: Vec<EntityKey>,
    pub unconnected_edges: Vec<EdgeSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedObject {
    pub identity: EntityKey,
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeSummary {
    pub owner: EntityKey,
    pub attribute: String,
    pub target: String,
}

impl From<UnconnectedEdge> for EdgeSummary {
    fn from(edge: UnconnectedEdge) -> Self {
        Self {
            owner: edge.owner,
            attribute: edge.attribute,
            target: edge.lazy.to_string(),
        }
    }
}

impl Inventory {
    /// Reads and builds the document at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let source = path.display().to_string();
        let contents = fs::read_to_string(path).map_err(|e| InventoryError::Inventory {
            message: format!("failed to read inventory: {e}"),
            path: source.clone(),
        })?;
        let document: InventoryDocument =
            serde_json::from_str(&contents).map_err(|e| InventoryError::Inventory {
                message: format!("failed to parse inventory: {e}"),
                path: source.clone(),
            })?;
        Self::build(document, source)
    }

    pub fn from_document(document: InventoryDocument) -> Result<Self> {
        Self::build(document, INLINE_SOURCE.to_string())
    }

    /// Creates every collection first, then indexes persisted rows, then
    /// builds objects in document order. Lazy values are constructed while
    /// their object is built, which is when skeletal pre-create happens.
    fn build(document: InventoryDocument, source: String) -> Result<Self> {
        let mut inventory = Self {
            collections: Vec::with_capacity(document.collections.len()),
            source,
        };

        for entry in &document.collections {
            if entry.spec.name.is_empty() {
                return Err(inventory.error("collection without a name".to_string()));
            }
            if inventory.collection(&entry.spec.name).is_some() {
                return Err(inventory.error(format!("duplicate collection '{}'", entry.spec.name)));
            }
            inventory
                .collections
                .push(Arc::new(InMemoryCollection::new(entry.spec.clone())));
        }

        for (entry, collection) in document.collections.iter().zip(&inventory.collections) {
            for row in &entry.persisted {
                collection.load_persisted(PersistedRecord::new(row.clone()));
            }
        }

        for (entry, collection) in document.collections.iter().zip(&inventory.collections) {
            for object in &entry.objects {
                let data = inventory.attr_map(object)?;
                collection.build(data);
            }
        }

        tracing::debug!(
            source = %inventory.source,
            collections = inventory.collections.len(),
            "inventory built"
        );
        Ok(inventory)
    }

    pub fn collections(&self) -> &[Arc<InMemoryCollection>] {
        &self.collections
    }

    pub fn collection(&self, name: &str) -> Option<&Arc<InMemoryCollection>> {
        self.collections.iter().find(|c| c.name() == name)
    }

    /// Resolves the attributes of every built object and drains the
    /// unconnected edges recorded along the way.
    pub fn resolve(&self, resolver: &LazyResolver) -> Result<ResolveReport> {
        let mut report = ResolveReport::default();

        for collection in &self.collections {
            for object in collection.objects() {
                let attributes = resolver
                    .resolve_attributes(&object)?
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect();
                report.objects.push(ResolvedObject {
                    identity: object.identity(),
                    attributes,
                });
            }
            report.placeholders.extend(
                collection
                    .skeletal_objects()
                    .iter()
                    .map(|placeholder| placeholder.identity()),
            );
        }

        report.unconnected_edges = self
            .collections
            .iter()
            .flat_map(|c| c.take_unconnected_edges())
            .map(EdgeSummary::from)
            .collect();

        Ok(report)
    }

    /// Save-order dependencies of each collection.
    pub fn dependencies(&self, resolver: &LazyResolver) -> BTreeMap<String, DependencyScan> {
        self.collections
            .iter()
            .map(|collection| {
                let objects = collection.objects();
                let scan = resolver.scan_dependencies(objects.iter().map(|o| o.as_ref()));
                (collection.name().to_string(), scan)
            })
            .collect()
    }

    fn attr_map(&self, map: &Map<String, Value>) -> Result<AttrMap> {
        map.iter()
            .map(|(name, value)| Ok((name.clone(), self.attr_value(value)?)))
            .collect()
    }

    fn attr_value(&self, value: &Value) -> Result<AttrValue> {
        match value.as_object() {
            Some(object) if object.len() == 1 && object.contains_key(LAZY_TAG) => {
                let handle = self.lazy_handle(&object[LAZY_TAG])?;
                Ok(AttrValue::from(handle))
            }
            _ => Ok(AttrValue::Value(value.clone())),
        }
    }

    fn lazy_handle(&self, spec: &Value) -> Result<LazyHandle> {
        let spec: LazySpec = serde_json::from_value(spec.clone())
            .map_err(|e| self.error(format!("invalid {LAZY_TAG} value: {e}")))?;
        let collection = self
            .collection(&spec.collection)
            .ok_or_else(|| InventoryError::UnknownCollection {
                name: spec.collection.clone(),
            })?;

        let data = match &spec.data {
            Value::Object(map) => self.attr_map(map)?,
            scalar => {
                let key = match collection.index_keys(&spec.ref_name) {
                    Some([key]) => key.clone(),
                    _ => {
                        return Err(self.error(format!(
                            "scalar {LAZY_TAG} data needs a single-key reference, '{}' of '{}' is not one",
                            spec.ref_name, spec.collection
                        )))
                    }
                };
                AttrMap::from([(key, self.attr_value(scalar)?)])
            }
        };

        let options = LazyFindOptions {
            ref_name: spec.ref_name,
            key: spec.key,
            default: spec.default,
            transform_nested_lazy_finds: spec.transform_nested_lazy_finds,
        };
        Ok(LazyHandle::new(collection.clone(), data, options))
    }

    fn error(&self, message: String) -> InventoryError {
        InventoryError::Inventory {
            message,
            path: self.source.clone(),
        }
    }
}
