//! The collection contract consumed by lazy handles.
//!
//! A collection stores and indexes the entities of one type. Lazy handles
//! only need it to build references, look entities up, describe which
//! attributes are relations, expose its save strategy and keep track of
//! edges that could not be connected yet.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::lazy::LazyHandle;
use crate::reference::Reference;
use crate::types::{AttrMap, FoundEntity, InventoryObject};

/// In-memory collection used by the CLI and tests.
pub mod memory;

pub use memory::{CollectionSpec, InMemoryCollection, SkeletalPrimaryIndex};

/// Placeholder entities keyed by primary reference.
///
/// Implementations must make `find_or_build` atomic per natural key:
/// concurrent calls with the same key data return the same entity.
pub trait SkeletalIndex: Send + Sync {
    /// Returns the entity already indexed under the natural key in `data`,
    /// or builds a placeholder carrying only `data`.
    fn find_or_build(&self, data: &AttrMap) -> Arc<InventoryObject>;
}

/// Per-entity-type store.
pub trait Collection: Send + Sync {
    /// Name of the collection, used in logs and edge records.
    fn name(&self) -> &str;

    /// Builds the `ref_name` reference for raw attribute `data`.
    fn build_reference(&self, data: &AttrMap, ref_name: &str) -> Reference;

    /// Finds the entity matching `reference`.
    fn find(&self, reference: &Reference) -> Option<FoundEntity>;

    /// Attributes declared as dependencies of this collection.
    fn dependency_attributes(&self) -> &BTreeSet<String>;

    /// Association name to foreign key column. A `None` value means the
    /// association is known but has no foreign key.
    fn association_foreign_keys(&self) -> &BTreeMap<String, Option<String>>;

    /// Whether the save strategy tolerates unordered or partial data
    /// arriving through unique-index upserts.
    fn is_parallel_safe(&self) -> bool;

    /// Whether this collection has already been saved.
    fn is_saved(&self) -> bool;

    fn skeletal_index(&self) -> &dyn SkeletalIndex;

    /// Records that `attribute` of `owner` could not be connected through
    /// `lazy` yet.
    fn store_unconnected_edge(&self, owner: &InventoryObject, attribute: &str, lazy: &LazyHandle);
}
