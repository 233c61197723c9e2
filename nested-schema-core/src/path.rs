//! Rebuilding schema trees from flat, colon-delimited column paths
//!
//! Columns are inserted into a trie keyed by path segment. Once every column
//! is in, the trie is converted bottom-up: a node whose children are named
//! exactly `{lengths, values}` becomes a list, exactly `{lengths, keys,
//! values}` a map, and anything else a struct. A childless node is a scalar
//! and must carry the column inserted at its path.

use std::collections::BTreeSet;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, trace};

use crate::column::{BlobRef, TypedColumn};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::schema::{Schema, KEYS, LENGTHS, VALUES};

/// Path separator in flattened column names
pub const SEPARATOR: char = ':';

/// A flat description of a schema's columns as parallel sequences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnList<H = BlobRef> {
    /// Colon-delimited column paths
    pub names: Vec<String>,

    /// Column types, untyped when `None`
    pub types: Vec<Option<DType>>,

    /// Storage handles
    pub blobs: Vec<Option<H>>,

    /// Column metadata
    pub metadata: Vec<Option<Metadata>>,
}

impl<H> ColumnList<H> {
    /// Create a column list with names only
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let len = names.len();
        Self {
            names,
            types: vec![None; len],
            blobs: std::iter::repeat_with(|| None).take(len).collect(),
            metadata: vec![None; len],
        }
    }

    /// Set the column types
    #[must_use]
    pub fn with_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Option<DType>>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Set the storage handles
    #[must_use]
    pub fn with_blobs<I, B>(mut self, blobs: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Option<H>>,
    {
        self.blobs = blobs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the column metadata
    #[must_use]
    pub fn with_metadata<I, M>(mut self, metadata: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Option<Metadata>>,
    {
        self.metadata = metadata.into_iter().map(Into::into).collect();
        self
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if there are no columns
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Check that all sequences have one entry per name
    pub fn validate(&self) -> Result<()> {
        let expected = self.names.len();
        for (what, actual) in [
            ("column types", self.types.len()),
            ("column blobs", self.blobs.len()),
            ("column metadata", self.metadata.len()),
        ] {
            if actual != expected {
                return Err(Error::arity(what, expected, actual));
            }
        }
        Ok(())
    }

    /// Rebuild the schema tree these columns describe
    pub fn into_schema(self) -> Result<Schema<H>> {
        from_column_list(self)
    }
}

impl<H: Serialize + DeserializeOwned> ColumnList<H> {
    /// Serialize to a binary format
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(Error::Serialization)
    }

    /// Deserialize from a binary format
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let columns: Self = bincode::deserialize(data).map_err(Error::Serialization)?;
        columns.validate()?;
        Ok(columns)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let columns: Self = serde_json::from_str(json)?;
        columns.validate()?;
        Ok(columns)
    }
}

impl<H: Clone> Schema<H> {
    /// Describe this schema as a flat column list. Handles are included when
    /// `keep_blobs` is set.
    pub fn to_column_list(&self, keep_blobs: bool) -> ColumnList<H> {
        let columns: Vec<&TypedColumn<H>> = self
            .all_scalars()
            .into_iter()
            .filter_map(|scalar| scalar.column())
            .collect();
        ColumnList {
            names: self.field_names(),
            types: columns.iter().map(|c| Some(c.dtype().clone())).collect(),
            blobs: columns
                .iter()
                .map(|c| if keep_blobs { c.blob().cloned() } else { None })
                .collect(),
            metadata: columns.iter().map(|c| c.metadata().cloned()).collect(),
        }
    }
}

#[derive(Debug)]
struct TrieNode<H> {
    name: String,
    children: Vec<TrieNode<H>>,
    column: Option<TypedColumn<H>>,
}

impl<H> TrieNode<H> {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            children: Vec::new(),
            column: None,
        }
    }

    fn child(&mut self, name: &str) -> &mut TrieNode<H> {
        let index = match self.children.iter().position(|child| child.name == name) {
            Some(index) => index,
            None => {
                self.children.push(TrieNode::new(name));
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }

    fn take_child(&mut self, name: &str) -> Option<TrieNode<H>> {
        let index = self.children.iter().position(|child| child.name == name)?;
        Some(self.children.remove(index))
    }

    fn log_tree(&self, path: &str) {
        for child in &self.children {
            let child_path = if path.is_empty() {
                child.name.clone()
            } else {
                format!("{path}{SEPARATOR}{}", child.name)
            };
            child.log_tree(&child_path);
        }
        trace!(
            path,
            children = self.children.len(),
            column = self.column.is_some(),
            "schema trie node"
        );
    }

    fn lengths_column(mut lengths: TrieNode<H>) -> Result<TypedColumn<H>> {
        if !lengths.children.is_empty() {
            return Err(Error::InvalidSchema(format!(
                "`{LENGTHS}` of list {:?} must be a single column",
                lengths.name
            )));
        }
        lengths
            .column
            .take()
            .ok_or_else(|| Error::InvalidSchema(format!("no column at {:?}", lengths.name)))
    }

    fn into_schema(mut self) -> Result<Schema<H>> {
        if self.children.is_empty() {
            return self.column.map(Schema::from_column).ok_or_else(|| {
                Error::InvalidSchema(format!("no column at {:?}", self.name))
            });
        }
        if self.column.is_some() {
            return Err(Error::InvalidSchema(format!(
                "{:?} is both a column and a parent of columns",
                self.name
            )));
        }

        let names: BTreeSet<&str> = self.children.iter().map(|c| c.name.as_str()).collect();
        let is_list = names == BTreeSet::from([LENGTHS, VALUES]);
        let is_map = names == BTreeSet::from([LENGTHS, KEYS, VALUES]);

        if is_list || is_map {
            let (Some(lengths), Some(values)) = (self.take_child(LENGTHS), self.take_child(VALUES))
            else {
                return Err(Error::InvalidSchema(format!("malformed list {:?}", self.name)));
            };
            let lengths = Self::lengths_column(lengths)?;
            let values = values.into_schema()?;
            if is_map {
                let keys = self
                    .take_child(KEYS)
                    .ok_or_else(|| Error::InvalidSchema(format!("malformed map {:?}", self.name)))?
                    .into_schema()?;
                debug!(name = %self.name, "detected map");
                return Schema::map_from_lengths(lengths, keys, values);
            }
            debug!(name = %self.name, "detected list");
            return Schema::list_from_lengths(lengths, values);
        }

        let fields = self
            .children
            .into_iter()
            .map(|child| {
                let name = child.name.clone();
                Ok((name, child.into_schema()?))
            })
            .collect::<Result<Vec<_>>>()?;
        Schema::structure(fields)
    }
}

/// Incrementally builds a schema tree from named columns
#[derive(Debug)]
pub struct PathBuilder<H = BlobRef> {
    root: TrieNode<H>,
    columns: usize,
}

impl<H> Default for PathBuilder<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> PathBuilder<H> {
    /// Create an empty builder
    pub fn new() -> Self {
        Self {
            root: TrieNode::new(""),
            columns: 0,
        }
    }

    /// Insert a column at a colon-delimited path.
    ///
    /// Fails with [`Error::InvalidSchema`] if a column was already inserted
    /// at the same path.
    pub fn insert(&mut self, path: &str, column: TypedColumn<H>) -> Result<&mut Self> {
        let mut node = &mut self.root;
        if !path.is_empty() {
            for segment in path.split(SEPARATOR) {
                node = node.child(segment);
            }
        }
        if node.column.is_some() {
            return Err(Error::InvalidSchema(format!("duplicate column {path:?}")));
        }
        trace!(path, dtype = %column.dtype(), "inserted column");
        node.column = Some(column);
        self.columns += 1;
        Ok(self)
    }

    /// Number of columns inserted so far
    pub fn num_columns(&self) -> usize {
        self.columns
    }

    /// Emit the trie at trace level
    pub fn log_tree(&self) {
        self.root.log_tree("");
    }

    /// Convert the trie into a schema tree.
    ///
    /// An empty builder yields an empty struct. A single column at the empty
    /// path yields a bare scalar.
    pub fn build(self) -> Result<Schema<H>> {
        debug!(columns = self.columns, "building schema from column paths");
        if self.root.children.is_empty() && self.root.column.is_none() {
            return Schema::structure(std::iter::empty::<(String, Schema<H>)>());
        }
        self.root.into_schema()
    }
}

/// Rebuild a schema tree from a flat column list.
///
/// Fails with [`Error::ArityMismatch`] if the parallel sequences disagree in
/// length.
pub fn from_column_list<H>(columns: ColumnList<H>) -> Result<Schema<H>> {
    columns.validate()?;
    let ColumnList {
        names,
        types,
        blobs,
        metadata,
    } = columns;

    let mut builder = PathBuilder::new();
    for (((name, dtype), blob), metadata) in names.into_iter().zip(types).zip(blobs).zip(metadata) {
        let mut column = TypedColumn::new(dtype.unwrap_or_default());
        if let Some(metadata) = metadata {
            column.set_metadata(metadata)?;
        }
        if let Some(blob) = blob {
            column.set_blob(blob);
        }
        builder.insert(&name, column)?;
    }
    builder.log_tree();
    builder.build()
}
