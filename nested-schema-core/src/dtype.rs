//! Element types for leaf columns

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Primitive element kind of a leaf column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    /// Type not known yet
    Untyped,

    /// Boolean
    Bool,

    /// 8-bit signed integer
    Int8,

    /// 16-bit signed integer
    Int16,

    /// 32-bit signed integer
    Int32,

    /// 64-bit signed integer
    Int64,

    /// 8-bit unsigned integer
    UInt8,

    /// 16-bit unsigned integer
    UInt16,

    /// 32-bit unsigned integer, used for list lengths
    UInt32,

    /// 32-bit floating point
    Float32,

    /// 64-bit floating point
    Float64,

    /// UTF-8 encoded string
    String,
}

impl PrimitiveType {
    /// Check if this type is an integer type
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            PrimitiveType::Int8
                | PrimitiveType::Int16
                | PrimitiveType::Int32
                | PrimitiveType::Int64
                | PrimitiveType::UInt8
                | PrimitiveType::UInt16
                | PrimitiveType::UInt32
        )
    }

    /// Get the size of one element in bytes, zero for variable-size types
    pub fn size_bytes(self) -> usize {
        match self {
            PrimitiveType::Bool | PrimitiveType::Int8 | PrimitiveType::UInt8 => 1,
            PrimitiveType::Int16 | PrimitiveType::UInt16 => 2,
            PrimitiveType::Int32 | PrimitiveType::UInt32 | PrimitiveType::Float32 => 4,
            PrimitiveType::Int64 | PrimitiveType::Float64 => 8,
            PrimitiveType::Untyped | PrimitiveType::String => 0,
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveType::Untyped => "untyped",
            PrimitiveType::Bool => "bool",
            PrimitiveType::Int8 => "int8",
            PrimitiveType::Int16 => "int16",
            PrimitiveType::Int32 => "int32",
            PrimitiveType::Int64 => "int64",
            PrimitiveType::UInt8 => "uint8",
            PrimitiveType::UInt16 => "uint16",
            PrimitiveType::UInt32 => "uint32",
            PrimitiveType::Float32 => "float32",
            PrimitiveType::Float64 => "float64",
            PrimitiveType::String => "string",
        };
        f.write_str(name)
    }
}

/// Element type of a leaf column: a primitive kind plus a fixed inner shape.
///
/// A column of dtype `(int32, [5])` holds one `5`-wide vector per row of its
/// domain. An empty shape means one primitive value per row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DType {
    base: PrimitiveType,
    shape: Vec<usize>,
}

impl DType {
    /// Create a dtype with no inner shape
    pub fn new(base: PrimitiveType) -> Self {
        Self {
            base,
            shape: Vec::new(),
        }
    }

    /// Create a dtype with a fixed inner shape
    pub fn with_shape(base: PrimitiveType, shape: impl Into<Vec<usize>>) -> Self {
        Self {
            base,
            shape: shape.into(),
        }
    }

    /// The untyped dtype
    pub fn untyped() -> Self {
        Self::new(PrimitiveType::Untyped)
    }

    /// Get the primitive element kind
    pub fn base(&self) -> PrimitiveType {
        self.base
    }

    /// Get the fixed inner shape
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Check if the element kind is an integer type
    pub fn is_integral(&self) -> bool {
        self.base.is_integral()
    }

    /// Check if this dtype is untyped
    pub fn is_untyped(&self) -> bool {
        self.base == PrimitiveType::Untyped
    }

    /// Number of primitive elements per row
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Map this dtype onto the external storage type enumeration
    pub fn storage_type(&self) -> Result<StorageType> {
        StorageType::try_from(self.base)
    }
}

impl From<PrimitiveType> for DType {
    fn from(base: PrimitiveType) -> Self {
        DType::new(base)
    }
}

impl Default for DType {
    fn default() -> Self {
        DType::untyped()
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shape.is_empty() {
            return write!(f, "{}", self.base);
        }
        write!(f, "({}, [", self.base)?;
        for (i, dim) in self.shape.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, "])")
    }
}

/// Element types understood by external typed storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageType {
    /// UTF-8 string
    String,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// Boolean
    Bool,
    /// 8-bit signed integer
    Int8,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 8-bit unsigned integer
    UInt8,
    /// 16-bit unsigned integer
    UInt16,
}

impl TryFrom<PrimitiveType> for StorageType {
    type Error = Error;

    fn try_from(base: PrimitiveType) -> Result<Self> {
        match base {
            PrimitiveType::String => Ok(StorageType::String),
            PrimitiveType::Float32 => Ok(StorageType::Float),
            PrimitiveType::Float64 => Ok(StorageType::Double),
            PrimitiveType::Bool => Ok(StorageType::Bool),
            PrimitiveType::Int8 => Ok(StorageType::Int8),
            PrimitiveType::Int16 => Ok(StorageType::Int16),
            PrimitiveType::Int32 => Ok(StorageType::Int32),
            PrimitiveType::Int64 => Ok(StorageType::Int64),
            PrimitiveType::UInt8 => Ok(StorageType::UInt8),
            PrimitiveType::UInt16 => Ok(StorageType::UInt16),
            PrimitiveType::UInt32 | PrimitiveType::Untyped => {
                Err(Error::UnknownDataType(base.to_string()))
            }
        }
    }
}

/// A type description that may be structured, the input of
/// [`from_dtype`](crate::convert::from_dtype).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DTypeSpec {
    /// A single primitive column type
    Primitive(DType),

    /// A record of named sub-fields, repeated over `shape`
    Record {
        /// Sub-fields in declaration order
        fields: Vec<RecordField>,
        /// Shape the whole record is repeated over
        shape: Vec<usize>,
    },
}

impl DTypeSpec {
    /// Create a record spec with packed fields and no outer shape
    pub fn record<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, DTypeSpec)>,
        S: Into<String>,
    {
        DTypeSpec::Record {
            fields: fields
                .into_iter()
                .map(|(name, dtype)| RecordField::new(name, dtype))
                .collect(),
            shape: Vec::new(),
        }
    }

    /// Check if this spec has named sub-fields
    pub fn is_structured(&self) -> bool {
        matches!(self, DTypeSpec::Record { .. })
    }
}

impl From<DType> for DTypeSpec {
    fn from(dtype: DType) -> Self {
        DTypeSpec::Primitive(dtype)
    }
}

impl From<PrimitiveType> for DTypeSpec {
    fn from(base: PrimitiveType) -> Self {
        DTypeSpec::Primitive(DType::new(base))
    }
}

impl TryFrom<DTypeSpec> for DType {
    type Error = Error;

    fn try_from(spec: DTypeSpec) -> Result<Self> {
        match spec {
            DTypeSpec::Primitive(dtype) => Ok(dtype),
            DTypeSpec::Record { .. } => Err(Error::InvalidSchema(
                "a scalar cannot hold a structured dtype, build a struct with from_dtype instead"
                    .to_string(),
            )),
        }
    }
}

/// A named sub-field of a structured type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordField {
    /// Name of the sub-field
    pub name: String,

    /// Type of the sub-field
    pub dtype: DTypeSpec,

    /// Explicit byte offset, `None` when the layout is packed
    pub offset: Option<usize>,
}

impl RecordField {
    /// Create a packed sub-field
    pub fn new(name: impl Into<String>, dtype: DTypeSpec) -> Self {
        Self {
            name: name.into(),
            dtype,
            offset: None,
        }
    }

    /// Create a sub-field at an explicit byte offset
    pub fn with_offset(name: impl Into<String>, dtype: DTypeSpec, offset: usize) -> Self {
        Self {
            name: name.into(),
            dtype,
            offset: Some(offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(DType::new(PrimitiveType::Int32).to_string(), "int32");
        assert_eq!(
            DType::with_shape(PrimitiveType::Float32, [2, 3]).to_string(),
            "(float32, [2, 3])"
        );
    }

    #[test]
    fn test_storage_type_mapping() {
        assert_eq!(
            DType::new(PrimitiveType::Float64).storage_type().unwrap(),
            StorageType::Double
        );
        assert_eq!(
            DType::with_shape(PrimitiveType::Int8, [4]).storage_type().unwrap(),
            StorageType::Int8
        );
        assert!(matches!(
            DType::untyped().storage_type(),
            Err(Error::UnknownDataType(_))
        ));
        assert!(matches!(
            DType::new(PrimitiveType::UInt32).storage_type(),
            Err(Error::UnknownDataType(_))
        ));
    }

    #[test]
    fn test_structured_spec_is_not_a_dtype() {
        let spec = DTypeSpec::record([("a", DTypeSpec::from(PrimitiveType::Int32))]);
        assert!(spec.is_structured());
        assert!(matches!(DType::try_from(spec), Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn test_num_elements() {
        assert_eq!(DType::new(PrimitiveType::Bool).num_elements(), 1);
        assert_eq!(DType::with_shape(PrimitiveType::Bool, [2, 5]).num_elements(), 10);
        assert!(PrimitiveType::UInt16.is_integral());
        assert!(!PrimitiveType::Float32.is_integral());
    }
}
