//! Lazy references.
//!
//! A [`LazyHandle`] is a deferred lookup of an entity by natural key,
//! optionally projected to one attribute. Handles are created while
//! ingestion data is still arriving and resolved at save time by a
//! [`LazyResolver`], which flattens nested secondary-index references,
//! performs the lookup and records unconnected edges for lookups that
//! should have matched but did not.

/// Dependency and transitive-dependency classification.
pub mod dependency;

/// The lazy handle type.
mod handle;

/// Resolution of handles to values.
mod resolver;

/// Skeletal pre-create policy.
pub mod skeletal;

pub use dependency::{scan_dependencies, AssociationNames, DependencyScan, ASSOCIATION_NAMES};
pub use handle::{LazyFindOptions, LazyHandle};
pub use resolver::{LazyResolver, MAX_NESTING_DEPTH};
pub use skeletal::{skeletal_precreate, SkeletalSkip};
