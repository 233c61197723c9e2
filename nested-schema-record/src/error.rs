//! Error types for record binding

use thiserror::Error;

/// Error type for record binding, generic over the storage collaborator's
/// error type
#[derive(Error, Debug)]
pub enum Error<E> {
    /// Schema error
    #[error("Schema error: {0}")]
    Schema(#[from] nested_schema_core::Error),

    /// Error reported by the external storage, passed through unchanged
    #[error("Storage error: {0}")]
    Storage(#[source] E),
}

/// Result type for record binding
pub type Result<T, E> = std::result::Result<T, Error<E>>;
