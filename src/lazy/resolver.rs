use crate::config::ResolverConfig;
use crate::errors::{InventoryError, Result};
use crate::lazy::dependency::{self, AssociationNames, DependencyScan};
use crate::lazy::LazyHandle;
use crate::reference::Reference;
use crate::types::{AttrMap, AttrValue, InventoryObject};

/// How many levels of lazy values may be nested inside a reference before
/// the ingestion graph is considered malformed.
pub const MAX_NESTING_DEPTH: usize = 20;

/// Resolves lazy handles and classifies them as dependencies.
///
/// Holds the settings that hosts may tune: the association names used for
/// dependency classification and the nesting bound for flattening.
#[derive(Debug, Clone)]
pub struct LazyResolver {
    associations: AssociationNames,
    max_nesting_depth: usize,
}

impl Default for LazyResolver {
    fn default() -> Self {
        Self {
            associations: AssociationNames::default(),
            max_nesting_depth: MAX_NESTING_DEPTH,
        }
    }
}

impl LazyResolver {
    /// Builds a resolver from configuration. The configured association
    /// names are added to the fixed ones, never replace them.
    pub fn new(config: &ResolverConfig) -> Self {
        let mut associations = AssociationNames::default();
        associations.extend(config.association_names.iter().cloned());
        Self {
            associations,
            max_nesting_depth: config.max_nesting_depth,
        }
    }

    pub fn associations(&self) -> &AssociationNames {
        &self.associations
    }

    pub fn max_nesting_depth(&self) -> usize {
        self.max_nesting_depth
    }

    pub fn is_dependency(&self, lazy: &LazyHandle) -> bool {
        dependency::is_dependency(lazy, &self.associations)
    }

    pub fn is_transitive_dependency(&self, lazy: &LazyHandle) -> bool {
        dependency::is_transitive_dependency(lazy, &self.associations)
    }

    /// Runs [`dependency::scan_dependencies`] with this resolver's
    /// association names.
    pub fn scan_dependencies<'a, I>(&self, objects: I) -> DependencyScan
    where
        I: IntoIterator<Item = &'a InventoryObject>,
    {
        dependency::scan_dependencies(objects, &self.associations)
    }

    /// Replaces every secondary-index lazy value among the reference keys
    /// with its resolved value, recursing into values that are themselves
    /// nested, then swaps in a reference rebuilt from the concrete data.
    ///
    /// A reference without nested secondary lookups is left untouched, so
    /// calling this again after a successful flatten is a no-op.
    pub fn transform_nested_secondary_indexes(&self, lazy: &mut LazyHandle) -> Result<()> {
        if !lazy.reference().has_nested_secondary_index() {
            return Ok(());
        }
        let reference = self.flattened_reference(lazy, 1)?;
        lazy.replace_reference(reference);
        Ok(())
    }

    /// `depth` is the nesting level of the values being resolved: 1 for
    /// lazy values directly inside `lazy`'s reference.
    fn flattened_reference(&self, lazy: &LazyHandle, depth: usize) -> Result<Reference> {
        if depth > self.max_nesting_depth {
            tracing::error!(
                collection = lazy.collection_name(),
                reference = %lazy.reference(),
                depth,
                "references nested too deep"
            );
            return Err(InventoryError::MalformedGraph {
                collection: lazy.collection_name().to_string(),
                reference: lazy.reference().to_string(),
                max_depth: self.max_nesting_depth,
            });
        }

        let reference = lazy.reference();
        let mut data = reference.full_reference().clone();
        for key in reference.keys() {
            let value = match reference.get(key) {
                Some(AttrValue::Lazy(nested)) if !nested.is_primary() => {
                    if nested.reference().has_nested_secondary_index() {
                        let flattened = self.flattened_reference(nested, depth + 1)?;
                        nested.load_with(&flattened)
                    } else {
                        nested.load_with(nested.reference())
                    }
                }
                _ => continue,
            };
            data.insert(key.clone(), value);
        }

        Ok(lazy
            .collection()
            .build_reference(&data, reference.ref_name()))
    }

    /// Resolves `lazy` to a value.
    ///
    /// Without a projection key the result is the found entity, or null.
    /// With a key it is the entity's attribute, or the handle's default when
    /// nothing was found or the attribute is null. When the lookup fails
    /// although the reference is loadable and `owner` names the entity and
    /// attribute holding the handle, an unconnected edge is stored on the
    /// target collection for a later repair pass.
    ///
    /// The only error is [`InventoryError::MalformedGraph`] from flattening.
    pub fn load(&self, lazy: &mut LazyHandle, owner: Option<(&InventoryObject, &str)>) -> Result<AttrValue> {
        if lazy.transform_nested_lazy_finds() && lazy.reference().has_nested_secondary_index() {
            self.transform_nested_secondary_indexes(lazy)?;
        }
        let lazy: &LazyHandle = lazy;

        let found = lazy.collection().find(lazy.reference());
        if found.is_none() {
            if let Some((object, attribute)) = owner {
                if lazy.reference().is_loadable() {
                    tracing::debug!(
                        owner = %object.identity(),
                        attribute,
                        lazy = %lazy,
                        "storing unconnected edge"
                    );
                    lazy.collection()
                        .store_unconnected_edge(object, attribute, lazy);
                }
            }
        }

        Ok(lazy.project(found))
    }

    /// Returns the data bag of `object` with every lazy value loaded. Each
    /// load names `object` and the attribute as owner, so misses become
    /// unconnected edges.
    ///
    /// `object` is shared and immutable, so each handle is loaded from a
    /// clone. Flattening happens on the clone: the stored handle keeps its
    /// nested reference and a later call flattens again against the data
    /// present at that time.
    pub fn resolve_attributes(&self, object: &InventoryObject) -> Result<AttrMap> {
        let mut resolved = AttrMap::new();
        for (attribute, value) in object.data() {
            let value = match value {
                AttrValue::Lazy(lazy) => {
                    let mut lazy = lazy.as_ref().clone();
                    self.load(&mut lazy, Some((object, attribute.as_str())))?
                }
                other => other.clone(),
            };
            resolved.insert(attribute.clone(), value);
        }
        Ok(resolved)
    }
}
