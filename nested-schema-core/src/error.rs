//! Error types for schema construction and binding

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for schema operations
#[derive(Error, Debug)]
pub enum Error {
    /// Structural violation while building a schema tree
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// A leaf without a storage handle was asked for one
    #[error("Field has no storage handle bound: {0:?}")]
    UnboundField(String),

    /// Parallel sequences disagree in length
    #[error("Arity mismatch for {what}: expected {expected}, got {actual}")]
    ArityMismatch {
        /// What was being counted
        what: String,
        /// Number of entries required
        expected: usize,
        /// Number of entries supplied
        actual: usize,
    },

    /// Structured type with explicit field byte offsets
    #[error("Unsupported layout: {0}")]
    UnsupportedLayout(String),

    /// Type with no counterpart in the storage type enumeration
    #[error("Unknown data type: {0}")]
    UnknownDataType(String),

    /// Two schemas were required to agree and do not
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Binary serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build an [`Error::ArityMismatch`] for the given sequence
    pub fn arity(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Error::ArityMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }
}
