//! Schema trees for nested, variable-length data
//!
//! A [`Schema`] describes a dataset of arbitrarily nested structs, lists and
//! maps as an ordered collection of fixed-type leaf columns. Flattening a tree
//! walks it depth-first, children in declared order, with every list emitting
//! its `lengths` column before its `values`. The resulting sequence is the
//! canonical column order shared by everything that binds or reads columns.
//!
//! Nodes live in an arena owned by the schema. Each node stores the index of
//! its parent and its ordinal among its siblings; both are written when the
//! node is attached and never change afterwards.

use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt;
use std::ops::Range;

use static_assertions::assert_impl_all;

use crate::column::{BlobRef, TypedColumn};
use crate::dtype::{DType, PrimitiveType};
use crate::error::{Error, Result};
use crate::metadata::Metadata;

/// Name of the lengths column of a list, reserved in structs
pub const LENGTHS: &str = "lengths";

/// Name of the values child of a list, and default value name of a map
pub const VALUES: &str = "values";

/// Default key name of a map
pub const KEYS: &str = "keys";

/// Index of a node inside its schema's arena
pub type NodeId = usize;

const ROOT: NodeId = 0;

/// The variant of a schema node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    /// A single typed column
    Scalar,
    /// A ragged sequence of `values` delimited by `lengths`
    List,
    /// An ordered set of named fields sharing one domain
    Struct,
}

#[derive(Debug, Clone)]
enum NodeKind<H> {
    Scalar(TypedColumn<H>),
    List { lengths: NodeId, values: NodeId },
    Struct { fields: Vec<(String, NodeId)> },
}

impl<H> NodeKind<H> {
    fn shifted(self, base: NodeId) -> Self {
        match self {
            NodeKind::Scalar(column) => NodeKind::Scalar(column),
            NodeKind::List { lengths, values } => NodeKind::List {
                lengths: lengths + base,
                values: values + base,
            },
            NodeKind::Struct { fields } => NodeKind::Struct {
                fields: fields.into_iter().map(|(name, id)| (name, id + base)).collect(),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct Node<H> {
    kind: NodeKind<H>,

    /// Parent node and ordinal among its siblings
    parent: Option<(NodeId, usize)>,

    /// Column offset of each child relative to this node
    child_offsets: Vec<usize>,

    /// Number of leaf columns under this node
    width: usize,
}

impl<H> Node<H> {
    fn placeholder() -> Self {
        Self {
            kind: NodeKind::Struct { fields: Vec::new() },
            parent: None,
            child_offsets: Vec::new(),
            width: 0,
        }
    }
}

pub(crate) fn join_field_name(prefix: &str, suffix: &str) -> String {
    match (prefix.is_empty(), suffix.is_empty()) {
        (false, false) => format!("{prefix}:{suffix}"),
        (false, true) => prefix.to_string(),
        (true, _) => suffix.to_string(),
    }
}

fn validate_field_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidSchema("field names cannot be empty".to_string()));
    }
    if name == LENGTHS {
        return Err(Error::InvalidSchema(format!(
            "a struct cannot contain a field named `{LENGTHS}`"
        )));
    }
    Ok(())
}

fn validate_child<H>(what: &str, child: &Schema<H>) -> Result<()> {
    if child.num_columns() == 0 {
        return Err(Error::InvalidSchema(format!("{what} has no columns")));
    }
    Ok(())
}

/// Collects child trees into a fresh arena below a new root
struct Composer<H> {
    nodes: Vec<Node<H>>,
    offsets: Vec<usize>,
    width: usize,
}

impl<H> Composer<H> {
    fn new() -> Self {
        Self {
            nodes: vec![Node::placeholder()],
            offsets: Vec::new(),
            width: 0,
        }
    }

    fn attach(&mut self, child: Schema<H>) -> NodeId {
        let base = self.nodes.len();
        let ordinal = self.offsets.len();
        self.offsets.push(self.width);
        self.width += child.num_columns();

        for mut node in child.nodes {
            node.kind = node.kind.shifted(base);
            node.parent = match node.parent {
                Some((parent, position)) => Some((parent + base, position)),
                None => Some((ROOT, ordinal)),
            };
            self.nodes.push(node);
        }
        base
    }

    fn finish(mut self, kind: NodeKind<H>) -> Schema<H> {
        self.offsets.push(self.width);
        let root = &mut self.nodes[ROOT];
        root.kind = kind;
        root.child_offsets = self.offsets;
        root.width = self.width;
        Schema { nodes: self.nodes }
    }
}

/// A struct field picked by name or by position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKey<'a> {
    /// Field name
    Name(&'a str),
    /// Position among the struct's fields
    Index(usize),
}

impl<'a> From<&'a str> for FieldKey<'a> {
    fn from(name: &'a str) -> Self {
        FieldKey::Name(name)
    }
}

impl<'a> From<&&'a str> for FieldKey<'a> {
    fn from(name: &&'a str) -> Self {
        FieldKey::Name(name)
    }
}

impl From<usize> for FieldKey<'_> {
    fn from(index: usize) -> Self {
        FieldKey::Index(index)
    }
}

impl fmt::Display for FieldKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKey::Name(name) => write!(f, "{name:?}"),
            FieldKey::Index(index) => write!(f, "#{index}"),
        }
    }
}

/// A schema tree, generic over the storage handle type of its leaves
#[derive(Debug, Clone)]
pub struct Schema<H = BlobRef> {
    nodes: Vec<Node<H>>,
}

assert_impl_all!(Schema<BlobRef>: Send, Sync, Clone);

impl<H> Schema<H> {
    /// Create a scalar schema from a column
    pub fn from_column(column: TypedColumn<H>) -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Scalar(column),
                parent: None,
                child_offsets: Vec::new(),
                width: 1,
            }],
        }
    }

    /// Create an unbound scalar of the given type
    pub fn scalar(dtype: impl Into<DType>) -> Self {
        Self::from_column(TypedColumn::new(dtype.into()))
    }

    /// Create an untyped, unbound scalar
    pub fn untyped() -> Self {
        Self::from_column(TypedColumn::untyped())
    }

    /// Create a scalar bound to a storage handle
    pub fn bound(dtype: impl Into<DType>, blob: H) -> Self {
        Self::from_column(TypedColumn::new(dtype.into()).with_blob(blob))
    }

    /// Create a scalar with metadata
    pub fn scalar_with_metadata(dtype: impl Into<DType>, metadata: Metadata) -> Result<Self> {
        Ok(Self::from_column(
            TypedColumn::new(dtype.into()).with_metadata(metadata)?,
        ))
    }

    /// Create a list of `values`.
    ///
    /// Fails with [`Error::InvalidSchema`] if `values` has no columns.
    pub fn list(values: Schema<H>) -> Result<Self> {
        Self::list_with_lengths(values, None)
    }

    /// Create a list of `values` whose lengths column is bound to `lengths_blob`
    pub fn list_with_lengths(values: Schema<H>, lengths_blob: Option<H>) -> Result<Self> {
        let mut lengths = TypedColumn::new(DType::new(PrimitiveType::UInt32));
        if let Some(blob) = lengths_blob {
            lengths.set_blob(blob);
        }
        Self::list_from_lengths(lengths, values)
    }

    /// Create a list from a prepared lengths column. The lengths dtype is
    /// always forced to `uint32`.
    pub(crate) fn list_from_lengths(mut lengths: TypedColumn<H>, values: Schema<H>) -> Result<Self> {
        validate_child("list values", &values)?;
        lengths.force_type(DType::new(PrimitiveType::UInt32));
        let mut composer = Composer::new();
        let lengths = composer.attach(Schema::from_column(lengths));
        let values = composer.attach(values);
        Ok(composer.finish(NodeKind::List { lengths, values }))
    }

    /// Create a struct from named fields, in order.
    ///
    /// Fails with [`Error::InvalidSchema`] if a name is empty, equals
    /// `lengths` or appears twice, or if a field has no columns.
    pub fn structure<I, S>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Schema<H>)>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut checked = Vec::new();
        for (name, field) in fields {
            let name = name.into();
            validate_field_name(&name)?;
            validate_child(&format!("field {name:?}"), &field)?;
            if !seen.insert(name.clone()) {
                return Err(Error::InvalidSchema(format!("duplicate field name {name:?}")));
            }
            checked.push((name, field));
        }
        Ok(Self::structure_unchecked(checked))
    }

    fn structure_unchecked(fields: Vec<(String, Schema<H>)>) -> Self {
        let mut composer = Composer::new();
        let fields = fields
            .into_iter()
            .map(|(name, field)| (name, composer.attach(field)))
            .collect();
        composer.finish(NodeKind::Struct { fields })
    }

    /// Create a struct with sequential field names `field_0`, `field_1`, ...
    pub fn tuple(fields: impl IntoIterator<Item = Schema<H>>) -> Result<Self> {
        Self::structure(
            fields
                .into_iter()
                .enumerate()
                .map(|(i, field)| (format!("field_{i}"), field)),
        )
    }

    /// Create a tuple of `num_fields` untyped scalars
    pub fn raw_tuple(num_fields: usize) -> Result<Self> {
        if num_fields == 0 {
            return Err(Error::InvalidSchema(
                "a raw tuple needs at least one field".to_string(),
            ));
        }
        Self::tuple((0..num_fields).map(|_| Schema::untyped()))
    }

    /// Create a map: a list of structs with `keys` and `values` fields
    pub fn map(keys: Schema<H>, values: Schema<H>) -> Result<Self> {
        Self::map_with_names(keys, values, KEYS, VALUES)
    }

    /// Create a map with custom key and value field names
    pub fn map_with_names(
        keys: Schema<H>,
        values: Schema<H>,
        keys_name: &str,
        values_name: &str,
    ) -> Result<Self> {
        let entries = Self::structure([(keys_name, keys), (values_name, values)])?;
        Self::list(entries)
    }

    pub(crate) fn map_from_lengths(
        lengths: TypedColumn<H>,
        keys: Schema<H>,
        values: Schema<H>,
    ) -> Result<Self> {
        let entries = Self::structure([(KEYS, keys), (VALUES, values)])?;
        Self::list_from_lengths(lengths, entries)
    }

    /// Get a view of the root node
    pub fn root(&self) -> NodeRef<'_, H> {
        NodeRef {
            schema: self,
            id: ROOT,
        }
    }

    /// Get a view of the node with the given arena index
    pub fn node(&self, id: NodeId) -> Option<NodeRef<'_, H>> {
        (id < self.nodes.len()).then_some(NodeRef { schema: self, id })
    }

    /// Get the variant of the root node
    pub fn kind(&self) -> SchemaKind {
        self.root().kind()
    }

    /// Number of leaf columns in the tree
    pub fn num_columns(&self) -> usize {
        self.nodes[ROOT].width
    }

    /// Look up a struct field of the root by name
    pub fn get_field(&self, name: &str) -> Option<NodeRef<'_, H>> {
        self.root().get_field(name)
    }

    /// Flattened path names of every leaf, in canonical order
    pub fn field_names(&self) -> Vec<String> {
        self.root().field_names()
    }

    /// Dtype of every leaf, in canonical order
    pub fn field_types(&self) -> Vec<&DType> {
        self.root().field_types()
    }

    /// Metadata of every leaf, in canonical order
    pub fn field_metadata(&self) -> Vec<Option<&Metadata>> {
        self.root().field_metadata()
    }

    /// Storage handle of every leaf, in canonical order
    pub fn field_blobs(&self) -> Result<Vec<&H>> {
        self.root().field_blobs()
    }

    /// Every scalar node, in canonical order
    pub fn all_scalars(&self) -> Vec<NodeRef<'_, H>> {
        self.root().all_scalars()
    }

    /// Check if every leaf has a storage handle
    pub fn has_blobs(&self) -> bool {
        self.root().has_blobs()
    }

    /// Copy the structure and bind the `i`-th leaf to the `i`-th handle
    pub fn bind<H2, I>(&self, handles: I) -> Result<Schema<H2>>
    where
        I: IntoIterator<Item = H2>,
    {
        self.root().bind(handles)
    }

    /// Copy the structure, keeping or dropping the storage handles
    #[must_use]
    pub fn clone_tree(&self, keep_blobs: bool) -> Self
    where
        H: Clone,
    {
        self.root().to_schema(keep_blobs)
    }

    /// Copy the structure without storage handles
    #[must_use]
    pub fn clone_schema(&self) -> Self {
        self.root().structure()
    }

    /// Project a struct onto the given fields, in the order given. Fields
    /// are picked by name or by position and may be mixed.
    pub fn select<'k, K>(&self, keys: impl IntoIterator<Item = K>) -> Result<Self>
    where
        H: Clone,
        K: Into<FieldKey<'k>>,
    {
        if self.kind() != SchemaKind::Struct {
            return Err(Error::InvalidSchema(format!(
                "cannot select fields from a {:?}",
                self.kind()
            )));
        }
        let root = self.root();
        let fields = keys
            .into_iter()
            .map(|key| {
                let key = key.into();
                let field = match key {
                    FieldKey::Name(name) => root.get_field(name),
                    FieldKey::Index(index) => root.field(index),
                };
                field
                    .map(|field| (field.name(), field.to_schema(true)))
                    .ok_or_else(|| Error::InvalidSchema(format!("field not found: {key}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::structure(fields)
    }

    fn leaf_id(&self, column: usize) -> Result<NodeId> {
        self.root()
            .all_scalars()
            .get(column)
            .map(|scalar| scalar.id)
            .ok_or_else(|| {
                Error::InvalidSchema(format!(
                    "no column at index {column}, schema has {}",
                    self.num_columns()
                ))
            })
    }

    /// Get the leaf column at a canonical position
    pub fn column(&self, column: usize) -> Option<&TypedColumn<H>> {
        self.root().all_scalars().get(column).and_then(NodeRef::column)
    }

    /// Get the leaf column at a canonical position for modification
    pub fn column_mut(&mut self, column: usize) -> Result<&mut TypedColumn<H>> {
        let id = self.leaf_id(column)?;
        match &mut self.nodes[id].kind {
            NodeKind::Scalar(leaf) => Ok(leaf),
            _ => Err(Error::InvalidSchema(format!("node {id} is not a scalar"))),
        }
    }

    /// Bind the leaf at a canonical position to a storage handle
    pub fn set_blob(&mut self, column: usize, blob: H) -> Result<()> {
        self.column_mut(column)?.set_blob(blob);
        Ok(())
    }

    /// Change the dtype of the leaf at a canonical position
    pub fn set_type(&mut self, column: usize, dtype: DType) -> Result<()> {
        self.column_mut(column)?.set_type(dtype)
    }

    /// Replace the metadata of the leaf at a canonical position
    pub fn set_metadata(&mut self, column: usize, metadata: Metadata) -> Result<()> {
        self.column_mut(column)?.set_metadata(metadata)
    }

    /// Attach the same metadata to every leaf. Nothing changes unless the
    /// metadata fits every leaf.
    pub fn set_metadata_all(&mut self, metadata: &Metadata) -> Result<()> {
        for column in self.root().columns() {
            metadata.validate_for(column.dtype())?;
        }
        for node in &mut self.nodes {
            if let NodeKind::Scalar(column) = &mut node.kind {
                column.set_metadata(metadata.clone())?;
            }
        }
        Ok(())
    }
}

impl<H1, H2> PartialEq<Schema<H2>> for Schema<H1> {
    fn eq(&self, other: &Schema<H2>) -> bool {
        self.root() == other.root()
    }
}

impl<'a, H> From<&'a Schema<H>> for NodeRef<'a, H> {
    fn from(schema: &'a Schema<H>) -> Self {
        schema.root()
    }
}

/// A borrowed view of one node of a [`Schema`]
pub struct NodeRef<'a, H = BlobRef> {
    schema: &'a Schema<H>,
    id: NodeId,
}

impl<H> Clone for NodeRef<'_, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H> Copy for NodeRef<'_, H> {}

impl<H> fmt::Debug for NodeRef<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("path", &self.path())
            .finish()
    }
}

impl<'a, H> NodeRef<'a, H> {
    fn node(&self) -> &'a Node<H> {
        &self.schema.nodes[self.id]
    }

    fn at(&self, id: NodeId) -> Self {
        Self {
            schema: self.schema,
            id,
        }
    }

    /// Index of this node in the schema's arena
    pub fn node_id(&self) -> NodeId {
        self.id
    }

    /// Get the variant of this node
    pub fn kind(&self) -> SchemaKind {
        match self.node().kind {
            NodeKind::Scalar(_) => SchemaKind::Scalar,
            NodeKind::List { .. } => SchemaKind::List,
            NodeKind::Struct { .. } => SchemaKind::Struct,
        }
    }

    /// Check if this node is a scalar
    pub fn is_scalar(&self) -> bool {
        self.kind() == SchemaKind::Scalar
    }

    /// Check if this node is a list
    pub fn is_list(&self) -> bool {
        self.kind() == SchemaKind::List
    }

    /// Check if this node is a struct
    pub fn is_struct(&self) -> bool {
        self.kind() == SchemaKind::Struct
    }

    /// The column of a scalar node
    pub fn column(&self) -> Option<&'a TypedColumn<H>> {
        match &self.node().kind {
            NodeKind::Scalar(column) => Some(column),
            _ => None,
        }
    }

    /// The lengths scalar of a list node
    pub fn lengths(&self) -> Option<Self> {
        match self.node().kind {
            NodeKind::List { lengths, .. } => Some(self.at(lengths)),
            _ => None,
        }
    }

    /// The values of a list node
    pub fn values(&self) -> Option<Self> {
        match self.node().kind {
            NodeKind::List { values, .. } => Some(self.at(values)),
            _ => None,
        }
    }

    /// Check if this is a list whose values are a struct
    pub fn is_struct_valued(&self) -> bool {
        self.values().is_some_and(|values| values.is_struct())
    }

    /// Named fields of a struct node, in order. Empty for other variants.
    pub fn fields(&self) -> impl Iterator<Item = (&'a str, NodeRef<'a, H>)> + 'a {
        let fields: &'a [(String, NodeId)] = match &self.node().kind {
            NodeKind::Struct { fields } => fields,
            _ => &[],
        };
        let schema = self.schema;
        fields
            .iter()
            .map(move |(name, id)| (name.as_str(), NodeRef { schema, id: *id }))
    }

    /// Number of fields of a struct node
    pub fn num_fields(&self) -> usize {
        match &self.node().kind {
            NodeKind::Struct { fields } => fields.len(),
            _ => 0,
        }
    }

    /// Get a struct field by position
    pub fn field(&self, index: usize) -> Option<Self> {
        match &self.node().kind {
            NodeKind::Struct { fields } => fields.get(index).map(|(_, id)| self.at(*id)),
            _ => None,
        }
    }

    /// Get a struct field by name
    pub fn get_field(&self, name: &str) -> Option<Self> {
        self.fields()
            .find(|(field_name, _)| *field_name == name)
            .map(|(_, field)| field)
    }

    /// Get a field of the struct inside a struct-valued list
    pub fn get_value_field(&self, name: &str) -> Option<Self> {
        if !self.is_struct_valued() {
            return None;
        }
        self.values().and_then(|values| values.get_field(name))
    }

    /// The parent of this node, `None` at the root
    pub fn parent(&self) -> Option<Self> {
        self.node().parent.map(|(parent, _)| self.at(parent))
    }

    /// Position of this node among its siblings
    pub fn ordinal(&self) -> usize {
        self.node().parent.map_or(0, |(_, ordinal)| ordinal)
    }

    /// Name of this node within its parent, empty at the root
    pub fn name(&self) -> &'a str {
        let Some((parent, ordinal)) = self.node().parent else {
            return "";
        };
        match &self.schema.nodes[parent].kind {
            NodeKind::List { .. } if ordinal == 0 => LENGTHS,
            NodeKind::List { .. } => VALUES,
            NodeKind::Struct { fields } => fields[ordinal].0.as_str(),
            NodeKind::Scalar(_) => "",
        }
    }

    /// Full column path of this node from the root
    pub fn path(&self) -> String {
        self.path_below(ROOT)
    }

    fn path_below(&self, ancestor: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = *self;
        while current.id != ancestor {
            segments.push(current.name());
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        segments
            .iter()
            .rev()
            .fold(String::new(), |path, segment| join_field_name(&path, segment))
    }

    /// Number of leaf columns under this node
    pub fn num_columns(&self) -> usize {
        self.node().width
    }

    /// The half-open range of canonical column positions owned by this node
    pub fn slice(&self) -> Range<usize> {
        let mut start = 0;
        let mut current = self.node();
        while let Some((parent, ordinal)) = current.parent {
            let parent = &self.schema.nodes[parent];
            start += parent.child_offsets[ordinal];
            current = parent;
        }
        start..start + self.node().width
    }

    /// Canonical position of the first column under this node. For a scalar,
    /// the position of its column in the whole tree.
    pub fn column_index(&self) -> usize {
        self.slice().start
    }

    /// Get the storage handle of a scalar.
    ///
    /// Fails with [`Error::UnboundField`] if the scalar is unbound and with
    /// [`Error::InvalidSchema`] if this node is not a scalar.
    pub fn get(&self) -> Result<&'a H> {
        let column = self
            .column()
            .ok_or_else(|| Error::InvalidSchema(format!("{} is not a scalar", self.path())))?;
        column
            .blob()
            .ok_or_else(|| Error::UnboundField(self.path()))
    }

    fn collect_names(&self, prefix: &str, names: &mut Vec<String>) {
        match &self.node().kind {
            NodeKind::Scalar(_) => names.push(prefix.to_string()),
            NodeKind::List { lengths, values } => {
                self.at(*lengths)
                    .collect_names(&join_field_name(prefix, LENGTHS), names);
                self.at(*values)
                    .collect_names(&join_field_name(prefix, VALUES), names);
            }
            NodeKind::Struct { fields } => {
                for (name, id) in fields {
                    self.at(*id).collect_names(&join_field_name(prefix, name), names);
                }
            }
        }
    }

    fn collect_scalars(&self, scalars: &mut Vec<Self>) {
        match &self.node().kind {
            NodeKind::Scalar(_) => scalars.push(*self),
            NodeKind::List { lengths, values } => {
                self.at(*lengths).collect_scalars(scalars);
                self.at(*values).collect_scalars(scalars);
            }
            NodeKind::Struct { fields } => {
                for (_, id) in fields {
                    self.at(*id).collect_scalars(scalars);
                }
            }
        }
    }

    /// Flattened path names of every leaf under this node, in canonical order.
    ///
    /// A bare scalar yields a single empty name.
    pub fn field_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.num_columns());
        self.collect_names("", &mut names);
        names
    }

    /// Every scalar node under this node, in canonical order
    pub fn all_scalars(&self) -> Vec<Self> {
        let mut scalars = Vec::with_capacity(self.num_columns());
        self.collect_scalars(&mut scalars);
        scalars
    }

    fn columns(&self) -> impl Iterator<Item = &'a TypedColumn<H>> {
        self.all_scalars()
            .into_iter()
            .filter_map(|scalar| scalar.column())
    }

    /// Dtype of every leaf under this node, in canonical order
    pub fn field_types(&self) -> Vec<&'a DType> {
        self.columns().map(TypedColumn::dtype).collect()
    }

    /// Metadata of every leaf under this node, in canonical order
    pub fn field_metadata(&self) -> Vec<Option<&'a Metadata>> {
        self.columns().map(TypedColumn::metadata).collect()
    }

    /// Storage handle of every leaf under this node, in canonical order.
    ///
    /// Fails with [`Error::UnboundField`] naming the first unbound leaf.
    pub fn field_blobs(&self) -> Result<Vec<&'a H>> {
        self.all_scalars()
            .into_iter()
            .map(|scalar| {
                scalar
                    .column()
                    .and_then(TypedColumn::blob)
                    .ok_or_else(|| Error::UnboundField(scalar.path_below(self.id)))
            })
            .collect()
    }

    /// Check if every leaf under this node has a storage handle
    pub fn has_blobs(&self) -> bool {
        self.columns().all(TypedColumn::has_blob)
    }

    /// Copy this subtree into an independent schema, keeping or dropping the
    /// storage handles
    pub fn to_schema(&self, keep_blobs: bool) -> Schema<H>
    where
        H: Clone,
    {
        self.try_map_blobs(|column| {
            let blob = if keep_blobs { column.blob().cloned() } else { None };
            Ok::<_, Infallible>(blob)
        })
        .unwrap_or_else(|never| match never {})
    }

    /// Copy the structure of this subtree with no storage handles bound
    pub fn structure<H2>(&self) -> Schema<H2> {
        self.try_map_blobs(|_| Ok::<_, Infallible>(None))
            .unwrap_or_else(|never| match never {})
    }

    /// Copy this subtree, computing each leaf's new handle from its column.
    ///
    /// `f` is called once per leaf, in canonical order.
    pub fn try_map_blobs<H2, E, F>(&self, mut f: F) -> std::result::Result<Schema<H2>, E>
    where
        F: FnMut(&TypedColumn<H>) -> std::result::Result<Option<H2>, E>,
    {
        self.rebuild(&mut f)
    }

    fn rebuild<H2, E, F>(&self, f: &mut F) -> std::result::Result<Schema<H2>, E>
    where
        F: FnMut(&TypedColumn<H>) -> std::result::Result<Option<H2>, E>,
    {
        let mut nodes = Vec::with_capacity(self.schema.nodes.len());
        self.copy_into(&mut nodes, None, f)?;
        Ok(Schema { nodes })
    }

    fn copy_into<H2, E, F>(
        &self,
        out: &mut Vec<Node<H2>>,
        parent: Option<(NodeId, usize)>,
        f: &mut F,
    ) -> std::result::Result<NodeId, E>
    where
        F: FnMut(&TypedColumn<H>) -> std::result::Result<Option<H2>, E>,
    {
        let node = self.node();
        let id = out.len();
        let kind = match &node.kind {
            NodeKind::Scalar(column) => NodeKind::Scalar(column.with_handle(f(column)?)),
            _ => NodeKind::Struct { fields: Vec::new() },
        };
        out.push(Node {
            kind,
            parent,
            child_offsets: node.child_offsets.clone(),
            width: node.width,
        });

        match &node.kind {
            NodeKind::Scalar(_) => {}
            NodeKind::List { lengths, values } => {
                let lengths = self.at(*lengths).copy_into(out, Some((id, 0)), f)?;
                let values = self.at(*values).copy_into(out, Some((id, 1)), f)?;
                out[id].kind = NodeKind::List { lengths, values };
            }
            NodeKind::Struct { fields } => {
                let mut copied = Vec::with_capacity(fields.len());
                for (ordinal, (name, child)) in fields.iter().enumerate() {
                    let child = self.at(*child).copy_into(out, Some((id, ordinal)), f)?;
                    copied.push((name.clone(), child));
                }
                out[id].kind = NodeKind::Struct { fields: copied };
            }
        }
        Ok(id)
    }

    /// Copy this subtree's structure and bind the `i`-th leaf to the `i`-th
    /// handle. Fails with [`Error::ArityMismatch`] unless there is exactly one
    /// handle per leaf.
    pub fn bind<H2, I>(&self, handles: I) -> Result<Schema<H2>>
    where
        I: IntoIterator<Item = H2>,
    {
        let handles: Vec<H2> = handles.into_iter().collect();
        let expected = self.num_columns();
        if handles.len() != expected {
            return Err(Error::arity("storage handles", expected, handles.len()));
        }
        let mut handles = handles.into_iter();
        self.try_map_blobs(|_| Ok(handles.next()))
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        let label = match self.name() {
            "" => String::new(),
            name => format!("{name}: "),
        };
        match &self.node().kind {
            NodeKind::Scalar(column) => writeln!(f, "{indent}{label}{}", column.dtype()),
            NodeKind::List { lengths, values } => {
                writeln!(f, "{indent}{label}List")?;
                self.at(*lengths).fmt_tree(f, depth + 1)?;
                self.at(*values).fmt_tree(f, depth + 1)
            }
            NodeKind::Struct { fields } => {
                writeln!(f, "{indent}{label}Struct")?;
                for (_, id) in fields {
                    self.at(*id).fmt_tree(f, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

/// Order-sensitive equality of names, types and metadata
impl<H1, H2> PartialEq<NodeRef<'_, H2>> for NodeRef<'_, H1> {
    fn eq(&self, other: &NodeRef<'_, H2>) -> bool {
        self.field_names() == other.field_names()
            && self.field_types() == other.field_types()
            && self.field_metadata() == other.field_metadata()
    }
}

impl<H> fmt::Display for NodeRef<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

impl<H> fmt::Display for Schema<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root().fmt_tree(f, 0)
    }
}

/// Copy the structure of `schema` and bind its leaves, in canonical order,
/// to `handles`
pub fn from_blob_list<'a, H, H2, I>(schema: impl Into<NodeRef<'a, H>>, handles: I) -> Result<Schema<H2>>
where
    H: 'a,
    I: IntoIterator<Item = H2>,
{
    schema.into().bind(handles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int32() -> DType {
        DType::new(PrimitiveType::Int32)
    }

    fn float32() -> DType {
        DType::new(PrimitiveType::Float32)
    }

    fn nested() -> Schema {
        Schema::structure([
            ("a", Schema::untyped()),
            (
                "b",
                Schema::structure([("b1", Schema::untyped()), ("b2", Schema::untyped())]).unwrap(),
            ),
            ("c", Schema::untyped()),
        ])
        .unwrap()
    }

    #[test]
    fn test_struct_of_list_flattens() {
        let schema: Schema = Schema::structure([
            ("a", Schema::scalar(int32())),
            ("b", Schema::list(Schema::scalar(float32())).unwrap()),
        ])
        .unwrap();

        assert_eq!(schema.field_names(), vec!["a", "b:lengths", "b:values"]);
        assert_eq!(
            schema.field_types(),
            vec![&int32(), &DType::new(PrimitiveType::UInt32), &float32()]
        );
        assert_eq!(schema.num_columns(), 3);
    }

    #[test]
    fn test_bare_scalar_has_one_empty_name() {
        let schema: Schema = Schema::scalar(int32());
        assert_eq!(schema.field_names(), vec![String::new()]);
        assert_eq!(schema.root().slice(), 0..1);
    }

    #[test]
    fn test_slice_of_nested_field() {
        let schema = nested();
        let b = schema.get_field("b").unwrap();
        assert_eq!(b.slice(), 1..3);

        let field_data = ["da", "db1", "db2", "dc"];
        assert_eq!(&field_data[b.slice()], &["db1", "db2"]);
        assert_eq!(b.get_field("b2").unwrap().column_index(), 2);
        assert_eq!(schema.get_field("c").unwrap().slice(), 3..4);
    }

    #[test]
    fn test_slice_inside_list() {
        let schema: Schema = Schema::structure([
            ("x", Schema::untyped()),
            (
                "y",
                Schema::list(
                    Schema::structure([("k", Schema::untyped()), ("v", Schema::untyped())]).unwrap(),
                )
                .unwrap(),
            ),
        ])
        .unwrap();

        let y = schema.get_field("y").unwrap();
        assert_eq!(y.slice(), 1..4);
        assert_eq!(y.lengths().unwrap().slice(), 1..2);
        assert_eq!(y.get_value_field("v").unwrap().slice(), 3..4);
        assert_eq!(y.get_value_field("v").unwrap().path(), "y:values:v");
    }

    #[test]
    fn test_reserved_and_duplicate_names() {
        let reserved = Schema::<BlobRef>::structure([("lengths", Schema::untyped())]);
        assert!(matches!(reserved, Err(Error::InvalidSchema(_))));

        let empty = Schema::<BlobRef>::structure([("", Schema::untyped())]);
        assert!(matches!(empty, Err(Error::InvalidSchema(_))));

        let duplicate =
            Schema::<BlobRef>::structure([("a", Schema::untyped()), ("a", Schema::untyped())]);
        assert!(matches!(duplicate, Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn test_equality_is_order_sensitive() {
        let a: Schema = Schema::structure([("a", Schema::untyped())]).unwrap();
        let a2: Schema = Schema::structure([("a", Schema::untyped())]).unwrap();
        assert_eq!(a, a2);

        let b: Schema = Schema::structure([("b", Schema::scalar(int32()))]).unwrap();
        let a_int: Schema = Schema::structure([("a", Schema::scalar(int32()))]).unwrap();
        assert_ne!(a_int, b);

        let ab: Schema = Schema::structure([("a", Schema::untyped()), ("b", Schema::untyped())]).unwrap();
        let ba: Schema = Schema::structure([("b", Schema::untyped()), ("a", Schema::untyped())]).unwrap();
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_equality_includes_metadata() {
        let plain: Schema = Schema::scalar(int32());
        let tagged: Schema = Schema::scalar_with_metadata(int32(), Metadata::categorical(5)).unwrap();
        assert_ne!(plain, tagged);
    }

    #[test]
    fn test_field_blobs_requires_binding() {
        let schema = nested();
        assert!(!schema.has_blobs());
        match schema.field_blobs() {
            Err(Error::UnboundField(name)) => assert_eq!(name, "a"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_bind_and_clone() {
        let schema = nested();
        let record: Schema = schema
            .root()
            .bind(["da", "db1", "db2", "dc"].map(BlobRef::new))
            .unwrap();
        assert!(record.has_blobs());
        assert_eq!(
            record
                .field_blobs()
                .unwrap()
                .into_iter()
                .map(BlobRef::name)
                .collect::<Vec<_>>(),
            vec!["da", "db1", "db2", "dc"]
        );

        let kept = record.clone_tree(true);
        assert!(kept.has_blobs());
        assert_eq!(kept, record);

        let stripped = record.clone_tree(false);
        assert!(!stripped.has_blobs());
        assert_eq!(stripped, schema);

        let err = schema.root().bind::<BlobRef, _>([BlobRef::new("only")]).unwrap_err();
        assert!(matches!(
            err,
            Error::ArityMismatch {
                expected: 4,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_subtree_copy_has_no_parent() {
        let schema = nested();
        let b = schema.get_field("b").unwrap().to_schema(true);
        assert!(b.root().parent().is_none());
        assert_eq!(b.field_names(), vec!["b1", "b2"]);
        assert_eq!(b.get_field("b2").unwrap().slice(), 1..2);
    }

    #[test]
    fn test_map_and_list_accessors() {
        let map: Schema = Schema::map(Schema::scalar(int32()), Schema::scalar(float32())).unwrap();
        assert_eq!(
            map.field_names(),
            vec!["lengths", "values:keys", "values:values"]
        );
        assert!(map.root().is_struct_valued());
        assert!(map.root().get_value_field("keys").unwrap().is_scalar());
        assert!(map.root().get_field("keys").is_none());

        let list: Schema = Schema::list(Schema::scalar(int32())).unwrap();
        assert!(!list.root().is_struct_valued());
        assert!(list.root().get_value_field("keys").is_none());
        assert_eq!(list.root().values().unwrap().name(), "values");
    }

    #[test]
    fn test_lengths_are_always_uint32() {
        let lengths = TypedColumn::new(DType::new(PrimitiveType::Int64));
        let list: Schema = Schema::list_from_lengths(lengths, Schema::untyped()).unwrap();
        assert_eq!(list.field_types()[0], &DType::new(PrimitiveType::UInt32));
    }

    #[test]
    fn test_tuples() {
        let tuple: Schema = Schema::tuple([Schema::scalar(int32()), Schema::scalar(float32())]).unwrap();
        assert_eq!(tuple.field_names(), vec!["field_0", "field_1"]);

        let raw: Schema = Schema::raw_tuple(3).unwrap();
        assert_eq!(raw.num_columns(), 3);
        assert!(raw.field_types().iter().all(|dtype| dtype.is_untyped()));
        assert!(Schema::<BlobRef>::raw_tuple(0).is_err());
    }

    #[test]
    fn test_select_projects_in_request_order() {
        let schema = nested();
        let projected = schema.select(&["c", "b"]).unwrap();
        assert_eq!(projected.field_names(), vec!["c", "b:b1", "b:b2"]);
        assert!(schema.select(&["missing"]).is_err());
        assert!(Schema::<BlobRef>::untyped().select(&["a"]).is_err());
    }

    #[test]
    fn test_select_by_position() {
        let schema = nested();
        let projected = schema
            .select([FieldKey::Index(2), FieldKey::from("a")])
            .unwrap();
        assert_eq!(projected.field_names(), vec!["c", "a"]);

        let by_index = schema.select([1usize]).unwrap();
        assert_eq!(by_index.field_names(), vec!["b:b1", "b:b2"]);
        assert!(matches!(
            schema.select([7usize]),
            Err(Error::InvalidSchema(message)) if message.contains("#7")
        ));
    }

    #[test]
    fn test_set_metadata_all_is_all_or_nothing() {
        let mut schema: Schema = Schema::structure([
            ("id", Schema::scalar(int32())),
            ("score", Schema::scalar(float32())),
        ])
        .unwrap();

        let err = schema.set_metadata_all(&Metadata::categorical(10));
        assert!(matches!(err, Err(Error::InvalidSchema(_))));
        assert!(schema.field_metadata().iter().all(Option::is_none));
    }

    #[test]
    fn test_columnless_children_are_rejected() {
        let empty = || Schema::<BlobRef>::structure(Vec::<(String, Schema)>::new()).unwrap();
        assert_eq!(empty().num_columns(), 0);

        assert!(matches!(Schema::list(empty()), Err(Error::InvalidSchema(_))));
        assert!(matches!(
            Schema::map(empty(), Schema::untyped()),
            Err(Error::InvalidSchema(_))
        ));
        assert!(matches!(
            Schema::structure([("a", Schema::untyped()), ("b", empty())]),
            Err(Error::InvalidSchema(_))
        ));
        assert!(Schema::tuple([empty()]).is_err());
    }

    #[test]
    fn test_leaf_mutation_by_position() {
        let mut schema = nested();
        schema.set_type(1, int32()).unwrap();
        schema.set_metadata(1, Metadata::categorical(7)).unwrap();
        schema.set_blob(3, BlobRef::new("dc")).unwrap();

        assert_eq!(schema.field_types()[1], &int32());
        assert_eq!(schema.column(3).and_then(TypedColumn::blob).map(BlobRef::name), Some("dc"));
        assert!(schema.set_blob(4, BlobRef::new("nope")).is_err());
        assert!(schema.set_type(1, float32()).is_err());

        schema.set_metadata_all(&Metadata::expected(1.0)).unwrap();
        assert!(schema
            .field_metadata()
            .into_iter()
            .all(|metadata| metadata.and_then(|m| m.expected_value) == Some(1.0)));
    }

    #[test]
    fn test_display_tree() {
        let schema: Schema = Schema::structure([
            ("a", Schema::scalar(int32())),
            ("b", Schema::list(Schema::scalar(float32())).unwrap()),
        ])
        .unwrap();
        assert_eq!(
            schema.to_string(),
            "Struct\n  a: int32\n  b: List\n    lengths: uint32\n    values: float32\n"
        );
    }

    #[test]
    fn test_scalar_get() {
        let mut schema = nested();
        schema.set_blob(1, BlobRef::new("b1")).unwrap();

        let b = schema.get_field("b").unwrap();
        assert_eq!(b.get_field("b1").unwrap().get().unwrap().name(), "b1");
        assert!(matches!(
            b.get_field("b2").unwrap().get(),
            Err(Error::UnboundField(path)) if path == "b:b2"
        ));
        assert!(matches!(b.get(), Err(Error::InvalidSchema(_))));
    }
}
