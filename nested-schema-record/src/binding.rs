//! Reading and writing records through external storage
//!
//! A record is a schema tree whose leaves are bound to storage handles. The
//! functions here walk the leaves in canonical column order and hand each one
//! to the external reader, writer or allocator. External calls may block;
//! callers in a concurrent host should run these on a suitable thread pool.

use nested_schema_core::{DType, Schema};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::storage::{NameGenerator, StorageAllocator, StorageReader, StorageWriter};

/// Configuration for naming freshly allocated blobs
#[derive(Debug, Clone)]
pub struct AllocateOptions {
    /// Name prefix used when the schema is a bare scalar
    pub unnamed_scalar_prefix: String,

    /// Optional path prefix joined in front of every column name
    pub field_prefix: Option<String>,
}

impl Default for AllocateOptions {
    fn default() -> Self {
        Self {
            unnamed_scalar_prefix: "unnamed_scalar".to_string(),
            field_prefix: None,
        }
    }
}

impl AllocateOptions {
    fn prefixed(&self, name: &str) -> String {
        match &self.field_prefix {
            Some(prefix) if !name.is_empty() => format!("{prefix}:{name}"),
            Some(prefix) => prefix.clone(),
            None => name.to_string(),
        }
    }

    fn name_prefixes<H>(&self, schema: &Schema<H>) -> Vec<String> {
        if schema.root().is_scalar() {
            return vec![self.prefixed(&self.unnamed_scalar_prefix)];
        }
        schema
            .field_names()
            .iter()
            .map(|name| self.prefixed(name))
            .collect()
    }
}

/// Leaf values to persist: either a record holding values, taken in its own
/// canonical order, or a flat ordered sequence
#[derive(Debug)]
pub enum LeafValues<'a, V> {
    /// The leaves of a record bound to values
    Record(&'a Schema<V>),

    /// One value per leaf, in canonical order
    Flat(&'a [V]),
}

impl<'a, V> LeafValues<'a, V> {
    fn resolve(self) -> nested_schema_core::Result<Vec<&'a V>> {
        match self {
            LeafValues::Record(record) => record.field_blobs(),
            LeafValues::Flat(values) => Ok(values.iter().collect()),
        }
    }
}

impl<'a, V> From<&'a Schema<V>> for LeafValues<'a, V> {
    fn from(record: &'a Schema<V>) -> Self {
        LeafValues::Record(record)
    }
}

impl<'a, V> From<&'a [V]> for LeafValues<'a, V> {
    fn from(values: &'a [V]) -> Self {
        LeafValues::Flat(values)
    }
}

impl<'a, V> From<&'a Vec<V>> for LeafValues<'a, V> {
    fn from(values: &'a Vec<V>) -> Self {
        LeafValues::Flat(values)
    }
}

/// Copy the structure of `schema` and bind its leaves, in canonical order, to
/// `handles`. Touches no storage.
pub fn bind<H, H2, I>(schema: &Schema<H>, handles: I) -> nested_schema_core::Result<Schema<H2>>
where
    I: IntoIterator<Item = H2>,
{
    schema.bind(handles)
}

/// Read every leaf of `record` through `reader`, producing a record of the
/// same structure bound to the values read
pub fn materialize<H, R>(record: &Schema<H>, reader: &R) -> Result<Schema<R::Value>, R::Error>
where
    R: StorageReader<H>,
{
    let handles = record.field_blobs()?;
    debug!(columns = handles.len(), "materializing record");

    let values = handles
        .into_iter()
        .map(|handle| reader.read(handle).map_err(Error::Storage))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(record.bind(values)?)
}

/// Like [`materialize`], reading the leaves in parallel
#[cfg(feature = "parallel")]
pub fn materialize_par<H, R>(record: &Schema<H>, reader: &R) -> Result<Schema<R::Value>, R::Error>
where
    H: Sync,
    R: StorageReader<H> + Sync,
    R::Value: Send,
    R::Error: Send,
{
    use rayon::prelude::*;

    let handles = record.field_blobs()?;
    debug!(columns = handles.len(), "materializing record in parallel");

    let values = handles
        .par_iter()
        .map(|handle| reader.read(handle).map_err(Error::Storage))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(record.bind(values)?)
}

/// Write one value per leaf of `record` through `writer`, in canonical order.
///
/// Fails with an arity mismatch unless there is exactly one value per leaf.
pub fn persist<'v, H, V, W>(
    record: &Schema<H>,
    values: impl Into<LeafValues<'v, V>>,
    writer: &mut W,
) -> Result<(), W::Error>
where
    V: 'v,
    W: StorageWriter<H, V>,
{
    let handles = record.field_blobs()?;
    let values = values.into().resolve()?;
    if values.len() != handles.len() {
        return Err(nested_schema_core::Error::arity("record values", handles.len(), values.len()).into());
    }

    debug!(columns = handles.len(), "persisting record");
    for (handle, value) in handles.into_iter().zip(values) {
        writer.write(handle, value).map_err(Error::Storage)?;
    }
    Ok(())
}

/// Request one fresh, uniquely named handle per leaf of `schema` and bind
/// them. Names derive from the column names through `names`.
pub fn allocate<H, A, N>(
    schema: &Schema<H>,
    allocator: &mut A,
    names: &mut N,
    options: &AllocateOptions,
) -> Result<Schema<A::Handle>, A::Error>
where
    A: StorageAllocator,
    N: NameGenerator + ?Sized,
{
    let prefixes = options.name_prefixes(schema);
    debug!(columns = prefixes.len(), "allocating record");

    let handles = prefixes
        .iter()
        .map(|prefix| {
            let name = names.next_name(prefix);
            trace!(%name, "allocating blob");
            allocator.create(&name).map_err(Error::Storage)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(schema.bind(handles)?)
}

/// Allocate a record shaped like `values` and write each of its values into
/// the new blobs
pub fn const_record<V, E, A, N, W>(
    values: &Schema<V>,
    allocator: &mut A,
    names: &mut N,
    writer: &mut W,
    options: &AllocateOptions,
) -> Result<Schema<A::Handle>, E>
where
    A: StorageAllocator<Error = E>,
    N: NameGenerator + ?Sized,
    W: StorageWriter<A::Handle, V, Error = E>,
{
    let record = allocate(values, allocator, names, options)?;
    persist(&record, values, writer)?;
    Ok(record)
}

/// Write an empty value into every leaf of a record, allocating the record
/// first if `schema_or_record` is not fully bound. `empty` builds the empty
/// value for a leaf's dtype.
pub fn init_empty_record<V, E, A, N, W, F>(
    schema_or_record: &Schema<A::Handle>,
    allocator: &mut A,
    names: &mut N,
    writer: &mut W,
    options: &AllocateOptions,
    empty: F,
) -> Result<Schema<A::Handle>, E>
where
    A: StorageAllocator<Error = E>,
    A::Handle: Clone,
    N: NameGenerator + ?Sized,
    W: StorageWriter<A::Handle, V, Error = E>,
    F: Fn(&DType) -> V,
{
    let record = if schema_or_record.has_blobs() {
        schema_or_record.clone()
    } else {
        allocate(schema_or_record, allocator, names, options)?
    };
    let values: Vec<V> = record.field_types().into_iter().map(empty).collect();
    persist(&record, &values, writer)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, StoreError};
    use crate::naming::NameScope;
    use nested_schema_core::{BlobRef, PrimitiveType};

    fn sample() -> Schema {
        Schema::structure([
            ("a", Schema::scalar(PrimitiveType::Int32)),
            ("b", Schema::list(Schema::scalar(PrimitiveType::Float32)).unwrap()),
        ])
        .unwrap()
    }

    #[test]
    fn test_allocate_names_follow_columns() {
        let mut store: MemoryStore<Vec<f64>> = MemoryStore::new();
        let mut names = NameScope::new();
        let record = allocate(&sample(), &mut store, &mut names, &AllocateOptions::default()).unwrap();

        let blobs: Vec<&str> = record
            .field_blobs()
            .unwrap()
            .into_iter()
            .map(BlobRef::name)
            .collect();
        assert_eq!(blobs, vec!["a", "b:lengths", "b:values"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_allocate_bare_scalar_and_prefix() {
        let mut store: MemoryStore<Vec<f64>> = MemoryStore::new();
        let mut names = NameScope::new();
        let options = AllocateOptions::default();
        let scalar: Schema = Schema::scalar(PrimitiveType::Int64);

        let first = allocate(&scalar, &mut store, &mut names, &options).unwrap();
        let second = allocate(&scalar, &mut store, &mut names, &options).unwrap();
        assert_eq!(first.field_blobs().unwrap()[0].name(), "unnamed_scalar");
        assert_eq!(second.field_blobs().unwrap()[0].name(), "unnamed_scalar_1");

        let options = AllocateOptions {
            field_prefix: Some("input".to_string()),
            ..AllocateOptions::default()
        };
        let record = allocate(&sample(), &mut store, &mut names, &options).unwrap();
        assert_eq!(record.field_blobs().unwrap()[1].name(), "input:b:lengths");
    }

    #[test]
    fn test_allocate_with_closure_names() {
        let mut store: MemoryStore<u8> = MemoryStore::new();
        let mut counter = 0;
        let mut names = |prefix: &str| {
            counter += 1;
            format!("{prefix}#{counter}")
        };
        let record = allocate(&sample(), &mut store, &mut names, &AllocateOptions::default()).unwrap();
        assert_eq!(record.field_blobs().unwrap()[2].name(), "b:values#3");
    }

    #[test]
    fn test_allocator_errors_pass_through() {
        let mut store: MemoryStore<u8> = MemoryStore::new();
        let mut same_name = |_: &str| "dup".to_string();
        let err = allocate(&sample(), &mut store, &mut same_name, &AllocateOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Storage(StoreError::AlreadyExists(name)) if name == "dup"));
    }

    #[test]
    fn test_persist_then_materialize() {
        let mut store: MemoryStore<Vec<i64>> = MemoryStore::new();
        let mut names = NameScope::with_scope("ws");
        let record = allocate(&sample(), &mut store, &mut names, &AllocateOptions::default()).unwrap();

        let values = vec![vec![1, 2], vec![2, 0], vec![7, 8]];
        persist(&record, &values, &mut store).unwrap();

        let materialized = materialize(&record, &store).unwrap();
        assert_eq!(materialized, record);
        assert_eq!(materialized.field_blobs().unwrap(), values.iter().collect::<Vec<_>>());

        let lengths = materialized.get_field("b").and_then(|b| b.lengths()).unwrap();
        assert_eq!(lengths.column().and_then(|c| c.blob()), Some(&vec![2, 0]));
    }

    #[test]
    fn test_persist_from_value_record() {
        let mut store: MemoryStore<String> = MemoryStore::new();
        let mut names = NameScope::new();
        let record = allocate(&sample(), &mut store, &mut names, &AllocateOptions::default()).unwrap();

        let value_record: Schema<String> = sample()
            .bind(["x", "y", "z"].map(String::from))
            .unwrap();
        persist(&record, &value_record, &mut store).unwrap();
        assert_eq!(store.get(&BlobRef::new("b:values")), Some(&"z".to_string()));
    }

    #[test]
    fn test_persist_arity_mismatch() {
        let mut store: MemoryStore<u8> = MemoryStore::new();
        let mut names = NameScope::new();
        let record = allocate(&sample(), &mut store, &mut names, &AllocateOptions::default()).unwrap();

        let err = persist(&record, &vec![1u8], &mut store).unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(nested_schema_core::Error::ArityMismatch {
                expected: 3,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_unbound_record_cannot_be_read() {
        let store: MemoryStore<u8> = MemoryStore::new();
        let err = materialize(&sample(), &store).unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(nested_schema_core::Error::UnboundField(_))
        ));
    }

    #[test]
    fn test_const_and_empty_records() {
        let mut store: MemoryStore<Vec<u32>> = MemoryStore::new();
        let mut names = NameScope::new();
        let options = AllocateOptions::default();

        let values: Schema<Vec<u32>> = sample().bind([vec![4], vec![1], vec![9]]).unwrap();
        let mut writer = MemoryStore::new();
        let record = const_record(&values, &mut store, &mut names, &mut writer, &options).unwrap();
        assert_eq!(materialize(&record, &writer).unwrap().field_blobs().unwrap()[2], &vec![9]);

        let schema: Schema = sample();
        let empty = init_empty_record(&schema, &mut store, &mut names, &mut writer, &options, |_| {
            Vec::new()
        })
        .unwrap();
        assert!(empty.has_blobs());
        assert!(materialize(&empty, &writer)
            .unwrap()
            .field_blobs()
            .unwrap()
            .iter()
            .all(|value| value.is_empty()));

        let again = init_empty_record(&empty, &mut store, &mut names, &mut writer, &options, |_| {
            vec![0]
        })
        .unwrap();
        assert_eq!(again.field_blobs().unwrap(), empty.field_blobs().unwrap());
    }
}
