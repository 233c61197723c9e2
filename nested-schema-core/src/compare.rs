//! Comparisons between schemas

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::schema::NodeRef;

/// Check that every column name of `schema` is also a column name of
/// `original`. Order is ignored.
pub fn is_schema_subset<'a, 'b, H1: 'a, H2: 'b>(
    schema: impl Into<NodeRef<'a, H1>>,
    original: impl Into<NodeRef<'b, H2>>,
) -> bool {
    let names = original.into().field_names();
    let available: HashSet<&str> = names.iter().map(String::as_str).collect();
    schema
        .into()
        .field_names()
        .iter()
        .all(|name| available.contains(name.as_str()))
}

/// Check that two schemas have the same column names and types, in the
/// same order. Metadata is not compared.
pub fn equal_schemas<'a, 'b, H1: 'a, H2: 'b>(
    schema: impl Into<NodeRef<'a, H1>>,
    original: impl Into<NodeRef<'b, H2>>,
) -> bool {
    let schema = schema.into();
    let original = original.into();
    schema.field_names() == original.field_names() && schema.field_types() == original.field_types()
}

/// Return `schema`, failing with [`Error::SchemaMismatch`] if `previous` is
/// given and differs from it by [`equal_schemas`]
pub fn schema_check<'a, 'b, H1: 'a, H2: 'b>(
    schema: impl Into<NodeRef<'a, H1>>,
    previous: Option<NodeRef<'b, H2>>,
) -> Result<NodeRef<'a, H1>> {
    let schema = schema.into();
    if let Some(previous) = previous {
        if !equal_schemas(schema, previous) {
            return Err(Error::SchemaMismatch(format!(
                "expected columns {:?}, got {:?}",
                previous.field_names(),
                schema.field_names()
            )));
        }
    }
    Ok(schema)
}
