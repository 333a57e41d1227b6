use thiserror::Error;

/// Errors that can occur while building or resolving lazy references.
///
/// Only `MalformedGraph` can come out of resolution itself. A lookup that
/// finds nothing is not an error: it yields the handle's default and, when
/// an owner is known, an unconnected edge.
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("references nested too deep: {reference} exceeds depth {max_depth} (collection: {collection})")]
    MalformedGraph {
        collection: String,
        reference: String,
        max_depth: usize,
    },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("inventory error: {message} (path: {path})")]
    Inventory { message: String, path: String },

    #[error("unknown collection: {name}")]
    UnknownCollection { name: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for results using `InventoryError`.
pub type Result<T> = std::result::Result<T, InventoryError>;
