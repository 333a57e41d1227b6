use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::collection::Collection;
use crate::lazy::LazyHandle;
use crate::types::{AttrValue, InventoryObject};

/// Attribute names that always denote hierarchy links, whatever the target
/// collection declares.
pub const ASSOCIATION_NAMES: &[&str] = &["parent", "genealogy_parent"];

/// The set of attribute names treated as associations on every collection.
///
/// Defaults to [`ASSOCIATION_NAMES`]; hosts can extend it through
/// [`crate::config::ResolverConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationNames(BTreeSet<String>);

impl AssociationNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn extend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.extend(names.into_iter().map(Into::into));
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for AssociationNames {
    fn default() -> Self {
        Self::new(ASSOCIATION_NAMES.iter().copied())
    }
}

/// Returns `true` when `key` is a relation on `collection`: one of the
/// fixed association names, a declared dependency attribute, or an
/// association with a foreign key.
pub fn is_association(collection: &dyn Collection, key: &str, names: &AssociationNames) -> bool {
    if names.contains(key) {
        return true;
    }
    collection.dependency_attributes().contains(key)
        || matches!(collection.association_foreign_keys().get(key), Some(Some(_)))
}

/// A projection onto a relation attribute: resolving it requires the
/// related entity first, so the ordering requirement propagates.
pub fn is_transitive_dependency(lazy: &LazyHandle, names: &AssociationNames) -> bool {
    match lazy.key() {
        Some(key) => is_association(lazy.collection().as_ref(), key, names),
        None => false,
    }
}

/// A handle without projection points at the entity itself and is always
/// a dependency. A projected handle is one only if it is transitive.
pub fn is_dependency(lazy: &LazyHandle, names: &AssociationNames) -> bool {
    lazy.key().is_none() || is_transitive_dependency(lazy, names)
}

/// Save-order dependencies found in the data of one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyScan {
    /// Attribute name to the collections its lazy values depend on.
    pub dependency_attributes: BTreeMap<String, BTreeSet<String>>,
    /// Attributes holding at least one transitive dependency.
    pub transitive_dependency_attributes: BTreeSet<String>,
}

impl DependencyScan {
    /// All collections this data depends on.
    pub fn dependencies(&self) -> BTreeSet<String> {
        self.dependency_attributes
            .values()
            .flat_map(|names| names.iter().cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.dependency_attributes.is_empty()
    }
}

/// Walks every attribute of `objects` and records which lazy values are
/// dependencies. Lazy values nested inside references count for the
/// attribute that holds the outer handle.
pub fn scan_dependencies<'a, I>(objects: I, names: &AssociationNames) -> DependencyScan
where
    I: IntoIterator<Item = &'a InventoryObject>,
{
    let mut scan = DependencyScan::default();
    for object in objects {
        for (attribute, value) in object.data() {
            if let AttrValue::Lazy(lazy) = value {
                record_lazy(&mut scan, attribute, lazy, names);
            }
        }
    }
    scan
}

fn record_lazy(scan: &mut DependencyScan, attribute: &str, lazy: &LazyHandle, names: &AssociationNames) {
    if is_dependency(lazy, names) {
        scan.dependency_attributes
            .entry(attribute.to_string())
            .or_default()
            .insert(lazy.collection_name().to_string());
    }
    if is_transitive_dependency(lazy, names) {
        scan.transitive_dependency_attributes
            .insert(attribute.to_string());
    }

    for value in lazy.reference().full_reference().values() {
        if let AttrValue::Lazy(nested) = value {
            record_lazy(scan, attribute, nested, names);
        }
    }
}
