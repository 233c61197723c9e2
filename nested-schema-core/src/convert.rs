//! Conversion from (possibly structured) type descriptions to schemas

use crate::dtype::{DType, DTypeSpec};
use crate::error::{Error, Result};
use crate::schema::Schema;

/// Build a schema from a type description.
///
/// Primitive types become scalars; records become structs of their
/// recursively converted fields. The record's shape is multiplied into the
/// shape of every leaf below it. Fields at explicit non-zero byte offsets
/// fail with [`Error::UnsupportedLayout`].
pub fn from_dtype<H>(spec: &DTypeSpec) -> Result<Schema<H>> {
    convert(spec, &[])
}

fn convert<H>(spec: &DTypeSpec, outer_shape: &[usize]) -> Result<Schema<H>> {
    match spec {
        DTypeSpec::Primitive(dtype) => {
            let shape: Vec<usize> = outer_shape.iter().chain(dtype.shape()).copied().collect();
            Ok(Schema::scalar(DType::with_shape(dtype.base(), shape)))
        }
        DTypeSpec::Record { fields, shape } => {
            let shape: Vec<usize> = outer_shape.iter().chain(shape).copied().collect();
            let fields = fields
                .iter()
                .map(|field| {
                    if let Some(offset) = field.offset.filter(|&offset| offset != 0) {
                        return Err(Error::UnsupportedLayout(format!(
                            "field {:?} is at byte offset {offset}",
                            field.name
                        )));
                    }
                    Ok((field.name.as_str(), convert(&field.dtype, &shape)?))
                })
                .collect::<Result<Vec<_>>>()?;
            Schema::structure(fields)
        }
    }
}
