//! Error types for the cache engine.

use thiserror::Error;

/// Errors surfaced by cache writes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Payload was not a JSON object and cannot be normalized.
    #[error("cannot normalize {type_name}: payload is not an object")]
    NotAnObject {
        /// Entity type name.
        type_name: String,
    },

    /// A declared key field was missing from the payload.
    #[error("cannot normalize {type_name}: missing key field '{field}'")]
    MissingKeyField {
        /// Entity type name.
        type_name: String,
        /// The absent key field.
        field: String,
    },
}
