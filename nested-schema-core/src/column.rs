//! Typed leaf columns and storage handles

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dtype::DType;
use crate::error::Result;
use crate::metadata::Metadata;

/// A named reference to a blob owned by an external store.
///
/// Cloning a `BlobRef` never copies the blob; the store decides its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobRef(Arc<str>);

impl BlobRef {
    /// Create a reference to the blob with the given name
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Get the name of the referenced blob
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlobRef {
    fn from(name: &str) -> Self {
        BlobRef::new(name)
    }
}

impl From<String> for BlobRef {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

/// One fixed-type storage unit of a schema tree.
///
/// `H` is the handle type of the backing storage. The column records which
/// storage backs it but never owns that storage.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedColumn<H = BlobRef> {
    /// Element type of the column
    dtype: DType,

    /// Optional descriptive metadata
    metadata: Option<Metadata>,

    /// Handle of the storage backing this column
    blob: Option<H>,
}

impl<H> TypedColumn<H> {
    /// Create an unbound column of the given type
    pub fn new(dtype: DType) -> Self {
        Self {
            dtype,
            metadata: None,
            blob: None,
        }
    }

    /// Create an untyped, unbound column
    pub fn untyped() -> Self {
        Self::new(DType::untyped())
    }

    /// Attach a storage handle
    #[must_use]
    pub fn with_blob(mut self, blob: H) -> Self {
        self.blob = Some(blob);
        self
    }

    /// Attach metadata, validated against the column's dtype
    pub fn with_metadata(mut self, metadata: Metadata) -> Result<Self> {
        self.set_metadata(metadata)?;
        Ok(self)
    }

    /// Get the element type
    pub fn dtype(&self) -> &DType {
        &self.dtype
    }

    /// Get the metadata, if any
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Get the storage handle, if bound
    pub fn blob(&self) -> Option<&H> {
        self.blob.as_ref()
    }

    /// Check if a storage handle is bound
    pub fn has_blob(&self) -> bool {
        self.blob.is_some()
    }

    /// Replace the element type, re-validating existing metadata
    pub fn set_type(&mut self, dtype: DType) -> Result<()> {
        if let Some(metadata) = &self.metadata {
            metadata.validate_for(&dtype)?;
        }
        self.dtype = dtype;
        Ok(())
    }

    /// Replace the metadata
    pub fn set_metadata(&mut self, metadata: Metadata) -> Result<()> {
        metadata.validate_for(&self.dtype)?;
        self.metadata = Some(metadata);
        Ok(())
    }

    /// Bind a storage handle, keeping dtype and metadata
    pub fn set_blob(&mut self, blob: H) {
        self.blob = Some(blob);
    }

    /// Unbind the storage handle
    pub fn take_blob(&mut self) -> Option<H> {
        self.blob.take()
    }

    pub(crate) fn force_type(&mut self, dtype: DType) {
        self.dtype = dtype;
    }

    /// Copy dtype and metadata onto a column with a different handle type
    pub fn with_handle<H2>(&self, blob: Option<H2>) -> TypedColumn<H2> {
        TypedColumn {
            dtype: self.dtype.clone(),
            metadata: self.metadata.clone(),
            blob,
        }
    }
}

impl<H> Default for TypedColumn<H> {
    fn default() -> Self {
        Self::untyped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::PrimitiveType;
    use crate::error::Error;

    #[test]
    fn test_column_binding() {
        let mut column: TypedColumn = TypedColumn::new(DType::new(PrimitiveType::Int32));
        assert!(!column.has_blob());

        column.set_blob(BlobRef::new("ids"));
        assert_eq!(column.blob().map(BlobRef::name), Some("ids"));

        let stripped: TypedColumn<BlobRef> = column.with_handle(None);
        assert!(!stripped.has_blob());
        assert_eq!(stripped.dtype(), column.dtype());
    }

    #[test]
    fn test_set_type_revalidates_metadata() {
        let mut column: TypedColumn = TypedColumn::untyped()
            .with_metadata(Metadata::categorical(10))
            .unwrap();

        assert!(matches!(
            column.set_type(DType::new(PrimitiveType::Float64)),
            Err(Error::InvalidSchema(_))
        ));
        assert!(column.dtype().is_untyped());

        column.set_type(DType::new(PrimitiveType::Int32)).unwrap();
        assert_eq!(column.dtype().base(), PrimitiveType::Int32);
    }

    #[test]
    fn test_blob_ref_is_shared() {
        let a = BlobRef::new("shared");
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(b.to_string(), "shared");
    }
}
