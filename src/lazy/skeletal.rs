use std::fmt;
use std::sync::Arc;

use crate::collection::Collection;
use crate::reference::Reference;
use crate::types::InventoryObject;

/// Why a skeletal pre-create did not happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkeletalSkip {
    /// The save strategy relies on save order, so placeholders could collide.
    NotParallelSafe,
    /// The collection is already saved.
    AlreadySaved,
    /// Only the primary reference backs a unique index.
    SecondaryReference,
    /// The reference carries no data.
    EmptyReference,
    /// A key is null or missing; the placeholder would break uniqueness.
    NullKey(String),
}

impl fmt::Display for SkeletalSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkeletalSkip::NotParallelSafe => write!(f, "collection is not parallel safe"),
            SkeletalSkip::AlreadySaved => write!(f, "collection is already saved"),
            SkeletalSkip::SecondaryReference => write!(f, "reference is not primary"),
            SkeletalSkip::EmptyReference => write!(f, "reference is empty"),
            SkeletalSkip::NullKey(key) => write!(f, "key '{key}' is null"),
        }
    }
}

/// Checks the pre-create preconditions in order and returns the first one
/// that fails.
pub fn check_preconditions(collection: &dyn Collection, reference: &Reference) -> Option<SkeletalSkip> {
    if !collection.is_parallel_safe() {
        return Some(SkeletalSkip::NotParallelSafe);
    }
    if collection.is_saved() {
        return Some(SkeletalSkip::AlreadySaved);
    }
    if !reference.is_primary() {
        return Some(SkeletalSkip::SecondaryReference);
    }
    if reference.full_reference().is_empty() {
        return Some(SkeletalSkip::EmptyReference);
    }
    reference
        .first_null_key()
        .map(|key| SkeletalSkip::NullKey(key.to_string()))
}

/// Hands the key values of `reference` to the collection's skeletal index
/// when every precondition holds. Returns the found or built placeholder.
pub fn skeletal_precreate(collection: &dyn Collection, reference: &Reference) -> Option<Arc<InventoryObject>> {
    if let Some(skip) = check_preconditions(collection, reference) {
        tracing::trace!(
            collection = collection.name(),
            reference = %reference,
            reason = %skip,
            "skipping skeletal pre-create"
        );
        return None;
    }

    tracing::debug!(
        collection = collection.name(),
        reference = %reference,
        "skeletal pre-create"
    );
    Some(collection.skeletal_index().find_or_build(&reference.key_values()))
}
