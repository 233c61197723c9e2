//! Schema trees for nested, variable-length datasets
//!
//! This crate represents datasets of arbitrarily nested structs, lists and
//! maps as a flat, ordered collection of fixed-type columns, in the manner of
//! columnar file formats. Trees are built either by nesting constructors or
//! from flat colon-delimited column paths, and their leaves can be bound to
//! handles of externally owned storage.

#![warn(missing_docs)]

pub mod column;
pub mod compare;
pub mod convert;
pub mod dtype;
pub mod error;
pub mod metadata;
pub mod path;
pub mod schema;

// Re-export key types for convenience
pub use column::{BlobRef, TypedColumn};
pub use compare::{equal_schemas, is_schema_subset, schema_check};
pub use convert::from_dtype;
pub use dtype::{DType, DTypeSpec, PrimitiveType, RecordField, StorageType};
pub use error::{Error, Result};
pub use metadata::{FeatureSpec, Metadata};
pub use path::{from_column_list, ColumnList, PathBuilder};
pub use schema::{from_blob_list, FieldKey, NodeId, NodeRef, Schema, SchemaKind};
