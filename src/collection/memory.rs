use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::collection::{Collection, SkeletalIndex};
use crate::lazy::LazyHandle;
use crate::reference::{join_fragments, stringify_keys, value_fragment, Reference, PRIMARY_REF};
use crate::types::{AttrMap, Entity, FoundEntity, InventoryObject, PersistedRecord, UnconnectedEdge};

/// Static description of a collection: its key sets, save strategy and
/// relation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionSpec {
    pub name: String,
    /// Attributes forming the primary natural key.
    pub manager_ref: Vec<String>,
    /// Named secondary key sets.
    pub secondary_refs: BTreeMap<String, Vec<String>>,
    pub parallel_safe: bool,
    pub saved: bool,
    pub dependency_attributes: BTreeSet<String>,
    pub association_foreign_keys: BTreeMap<String, Option<String>>,
}

impl Default for CollectionSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            manager_ref: vec!["ems_ref".to_string()],
            secondary_refs: BTreeMap::new(),
            parallel_safe: true,
            saved: false,
            dependency_attributes: BTreeSet::new(),
            association_foreign_keys: BTreeMap::new(),
        }
    }
}

impl CollectionSpec {
    /// Default spec for a collection called `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Skeletal placeholders of one collection, keyed by stringified primary
/// reference.
///
/// Shares the collection's map of built objects so that a key which already
/// has full data is found instead of shadowed by a placeholder.
pub struct SkeletalPrimaryIndex {
    collection: String,
    manager_ref: Vec<String>,
    objects: Arc<DashMap<String, Arc<InventoryObject>>>,
    placeholders: DashMap<String, Arc<InventoryObject>>,
}

impl SkeletalPrimaryIndex {
    fn new(
        collection: String,
        manager_ref: Vec<String>,
        objects: Arc<DashMap<String, Arc<InventoryObject>>>,
    ) -> Self {
        Self {
            collection,
            manager_ref,
            objects,
            placeholders: DashMap::new(),
        }
    }

    pub fn get(&self, manager_uuid: &str) -> Option<Arc<InventoryObject>> {
        self.placeholders.get(manager_uuid).map(|p| p.value().clone())
    }

    pub fn len(&self) -> usize {
        self.placeholders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placeholders.is_empty()
    }

    fn remove(&self, manager_uuid: &str) -> Option<Arc<InventoryObject>> {
        self.placeholders.remove(manager_uuid).map(|(_, p)| p)
    }

    fn values(&self) -> Vec<Arc<InventoryObject>> {
        self.placeholders.iter().map(|p| p.value().clone()).collect()
    }
}

impl SkeletalIndex for SkeletalPrimaryIndex {
    fn find_or_build(&self, data: &AttrMap) -> Arc<InventoryObject> {
        let manager_uuid = stringify_keys(&self.manager_ref, data);

        // Lock order is objects, then placeholders, as in
        // `InMemoryCollection::build`. Holding the vacant objects entry keeps
        // a concurrent build from landing between the check and the insert.
        match self.objects.entry(manager_uuid.clone()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(_slot) => {
                let placeholder = self
                    .placeholders
                    .entry(manager_uuid)
                    .or_insert_with(|| {
                        let reference =
                            Reference::new(PRIMARY_REF, self.manager_ref.clone(), data.clone());
                        Arc::new(InventoryObject::new(
                            self.collection.clone(),
                            reference,
                            data.clone(),
                        ))
                    })
                    .value()
                    .clone();
                placeholder
            }
        }
    }
}

/// A collection kept entirely in memory.
///
/// Lookups check skeletal placeholders and objects built during this run
/// (a key is never in both), then records loaded from the persistent store. Secondary
/// references are matched by scanning, which is fine for the sizes this
/// collection is used with.
pub struct InMemoryCollection {
    spec: CollectionSpec,
    saved: AtomicBool,
    objects: Arc<DashMap<String, Arc<InventoryObject>>>,
    skeletal: SkeletalPrimaryIndex,
    persisted: DashMap<String, Arc<PersistedRecord>>,
    unconnected_edges: Mutex<Vec<UnconnectedEdge>>,
}

impl InMemoryCollection {
    pub fn new(spec: CollectionSpec) -> Self {
        let objects = Arc::new(DashMap::new());
        let skeletal =
            SkeletalPrimaryIndex::new(spec.name.clone(), spec.manager_ref.clone(), objects.clone());
        Self {
            saved: AtomicBool::new(spec.saved),
            spec,
            objects,
            skeletal,
            persisted: DashMap::new(),
            unconnected_edges: Mutex::new(Vec::new()),
        }
    }

    pub fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    /// Key attributes of the `ref_name` variant, if this collection has it.
    pub fn index_keys(&self, ref_name: &str) -> Option<&[String]> {
        if ref_name == PRIMARY_REF {
            Some(&self.spec.manager_ref)
        } else {
            self.spec.secondary_refs.get(ref_name).map(Vec::as_slice)
        }
    }

    /// Adds an entity with full data.
    ///
    /// If a skeletal placeholder or an earlier build exists for the same
    /// primary key, `data` is merged into it and its reference is kept.
    pub fn build(&self, data: AttrMap) -> Arc<InventoryObject> {
        let reference = self.build_reference(&data, PRIMARY_REF);
        let manager_uuid = reference.stringified();

        // The objects entry stays locked while the placeholder is taken out,
        // so a placeholder never outlives the build that replaces it.
        match self.objects.entry(manager_uuid) {
            Entry::Occupied(mut entry) => {
                let merged = Arc::new(entry.get().merged(data));
                entry.insert(merged.clone());
                merged
            }
            Entry::Vacant(entry) => {
                let object = match self.skeletal.remove(entry.key()) {
                    Some(placeholder) => placeholder.merged(data),
                    None => InventoryObject::new(self.spec.name.clone(), reference, data),
                };
                let object = Arc::new(object);
                entry.insert(object.clone());
                object
            }
        }
    }

    /// Indexes a record that already exists in the persistent store.
    pub fn load_persisted(&self, record: PersistedRecord) -> Arc<PersistedRecord> {
        let manager_uuid = record_fragment(&self.spec.manager_ref, &record);
        let record = Arc::new(record);
        self.persisted.insert(manager_uuid, record.clone());
        record
    }

    pub fn mark_saved(&self) {
        self.saved.store(true, Ordering::SeqCst);
    }

    /// Built objects, ordered by primary reference.
    pub fn objects(&self) -> Vec<Arc<InventoryObject>> {
        let mut objects: Vec<_> = self.objects.iter().map(|o| o.value().clone()).collect();
        objects.sort_by_key(|o| o.manager_uuid());
        objects
    }

    /// Skeletal placeholders that have not received full data, ordered by
    /// primary reference.
    pub fn skeletal_objects(&self) -> Vec<Arc<InventoryObject>> {
        let mut objects = self.skeletal.values();
        objects.sort_by_key(|o| o.manager_uuid());
        objects
    }

    pub fn skeletal_primary_index(&self) -> &SkeletalPrimaryIndex {
        &self.skeletal
    }

    pub fn unconnected_edge_count(&self) -> usize {
        self.edges().len()
    }

    /// Drains the recorded unconnected edges for a repair pass.
    pub fn take_unconnected_edges(&self) -> Vec<UnconnectedEdge> {
        std::mem::take(&mut *self.edges())
    }

    fn edges(&self) -> std::sync::MutexGuard<'_, Vec<UnconnectedEdge>> {
        self.unconnected_edges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn find_by_secondary(&self, keys: &[String], wanted: &str) -> Option<FoundEntity> {
        let unsaved = self
            .objects
            .iter()
            .map(|o| o.value().clone())
            .chain(self.skeletal.values())
            .find(|o| stringify_keys(keys, o.data()) == wanted);
        if let Some(object) = unsaved {
            return Some(FoundEntity::Unsaved(object));
        }

        self.persisted
            .iter()
            .find(|r| record_fragment(keys, r.value()) == wanted)
            .map(|r| FoundEntity::Persisted(r.value().clone() as Arc<dyn Entity>))
    }
}

impl Collection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn build_reference(&self, data: &AttrMap, ref_name: &str) -> Reference {
        let keys = match self.index_keys(ref_name) {
            Some(keys) => keys.to_vec(),
            None => {
                tracing::warn!(
                    collection = %self.spec.name,
                    ref_name,
                    "unknown reference name, reference will not be loadable"
                );
                Vec::new()
            }
        };
        Reference::new(ref_name, keys, data.clone())
    }

    fn find(&self, reference: &Reference) -> Option<FoundEntity> {
        if !reference.is_loadable() {
            return None;
        }

        let wanted = reference.stringified();
        if !reference.is_primary() {
            return self.find_by_secondary(reference.keys(), &wanted);
        }

        // Placeholders first: a build removes the placeholder while holding
        // the objects entry, so a miss here is followed by a hit there.
        if let Some(placeholder) = self.skeletal.get(&wanted) {
            return Some(FoundEntity::Unsaved(placeholder));
        }
        if let Some(object) = self.objects.get(&wanted) {
            return Some(FoundEntity::Unsaved(object.value().clone()));
        }
        self.persisted
            .get(&wanted)
            .map(|r| FoundEntity::Persisted(r.value().clone() as Arc<dyn Entity>))
    }

    fn dependency_attributes(&self) -> &BTreeSet<String> {
        &self.spec.dependency_attributes
    }

    fn association_foreign_keys(&self) -> &BTreeMap<String, Option<String>> {
        &self.spec.association_foreign_keys
    }

    fn is_parallel_safe(&self) -> bool {
        self.spec.parallel_safe
    }

    fn is_saved(&self) -> bool {
        self.saved.load(Ordering::SeqCst)
    }

    fn skeletal_index(&self) -> &dyn SkeletalIndex {
        &self.skeletal
    }

    fn store_unconnected_edge(&self, owner: &InventoryObject, attribute: &str, lazy: &LazyHandle) {
        self.edges().push(UnconnectedEdge {
            owner: owner.identity(),
            attribute: attribute.to_string(),
            lazy: lazy.clone(),
        });
    }
}

/// Stringifies `keys` of a persisted record the same way references are.
fn record_fragment(keys: &[String], record: &PersistedRecord) -> String {
    join_fragments(keys.iter().map(|key| {
        record
            .attribute(key)
            .map(|v| value_fragment(&v))
            .unwrap_or_default()
    }))
}
