//! # Field Hierarchy
//!
//! A field translates read and write calls from/to underlying columns
//! to/from value trees. Fields form a tree: the root is an anonymous record
//! container owning a forest of top-level fields; leaves attach to physical
//! columns. Complex types resolve to multiple columns (a string is an offset
//! column plus a byte payload column); trivial scalars map 1:1.
//!
//! ## Module Structure
//!
//! - `create`: type-name grammar, validation, field factory
//! - `repr`: column-representation sets and selection
//! - `primitive`: scalar leaves and the string leaf
//! - `record`: record/class/pair/tuple layout, enum and atomic wrappers
//! - `collection`: variable-length collections, sets, proxies, the
//!   write-only untyped collection
//! - `array`: fixed arrays and bitsets
//! - `variant`: tagged alternatives over a switch column
//! - `nullable`: optional / unique-owning reference, dense or sparse
//! - `cardinality`: read-only collection-size projection
//! - `bulk`: masked bulk reads over a cluster-local range
//! - `iter`: depth-first schema iteration
//!
//! ## Lifecycle
//!
//! ```text
//! [*] --> Unconnected --> ConnectedToSink ----
//!              |      |                      |
//!              |      --> ConnectedToSource ---> [*]
//!              |                             |
//!              -------------------------------
//! ```
//!
//! Columns are created at connection time and live until the field is
//! dropped. Cloning returns the copy to `Unconnected` while keeping the
//! on-disk id. A field never moves between sink and source.

mod array;
mod bulk;
mod cardinality;
mod collection;
mod create;
mod iter;
mod nullable;
mod primitive;
mod record;
mod repr;
mod variant;

#[cfg(test)]
mod tests;

pub use bulk::{Bulk, BulkSpec, ALL_SET};
pub use collection::CollectionWriter;
pub use iter::SchemaIter;
pub use primitive::Primitive;
pub use repr::ColumnRepresentations;

use eyre::Result;
use smallvec::SmallVec;
use std::sync::Arc;

use crate::column::Column;
use crate::descriptor::Descriptor;
use crate::reflect::{CollectionProxy, ReadCallback, SharedResolver};
use crate::storage::{SharedSink, SharedSource, WriteOptions};
use crate::types::{ClusterIndex, ColumnType, EntryIndex, FieldId, FieldStructure};
use crate::value::Value;
use crate::{field_bail, field_ensure, field_err};

/// Properties of a field's type that allow for optimizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Traits(u8);

impl Traits {
    pub const NONE: Traits = Traits(0);
    /// Any bit pattern in freshly allocated memory is a valid value.
    pub const TRIVIALLY_CONSTRUCTIBLE: Traits = Traits(0x01);
    /// Releasing the memory is all the cleanup the value needs.
    pub const TRIVIALLY_DESTRUCTIBLE: Traits = Traits(0x02);
    /// Maps as-is onto a single packed column.
    pub const MAPPABLE: Traits = Traits(0x04);
    /// Both trivially constructible and destructible.
    pub const TRIVIAL_TYPE: Traits = Traits(0x03);

    pub fn contains(self, other: Traits) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_mappable(self) -> bool {
        self.contains(Traits::MAPPABLE)
    }
}

impl std::ops::BitOr for Traits {
    type Output = Traits;
    fn bitor(self, rhs: Traits) -> Traits {
        Traits(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for Traits {
    type Output = Traits;
    fn bitand(self, rhs: Traits) -> Traits {
        Traits(self.0 & rhs.0)
    }
}

impl std::ops::BitOrAssign for Traits {
    fn bitor_assign(&mut self, rhs: Traits) {
        self.0 |= rhs.0;
    }
}

impl std::ops::BitAndAssign for Traits {
    fn bitand_assign(&mut self, rhs: Traits) {
        self.0 &= rhs.0;
    }
}

/// Connection state of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    Unconnected,
    ConnectedToSink,
    ConnectedToSource,
}

/// Role of a record subfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubFieldRole {
    BaseClass,
    DataMember,
}

/// Memory-layout metadata of a record field, computed as a C layout would
/// be: member offsets with padding, total size, strictest alignment.
#[derive(Clone)]
pub(crate) struct RecordLayout {
    pub(crate) offsets: Vec<usize>,
    pub(crate) size: usize,
    pub(crate) max_align: usize,
    pub(crate) roles: Vec<SubFieldRole>,
    pub(crate) version: u32,
    pub(crate) resolver: Option<SharedResolver>,
}

/// Per-kind state of a field.
#[derive(Clone)]
pub(crate) enum FieldKind {
    /// The anonymous container at the top of the tree; never connects.
    Root,
    Leaf(Primitive),
    String { n_written: u64 },
    Record(RecordLayout),
    Enum,
    Atomic,
    Vector { n_written: u64 },
    Set { n_written: u64 },
    Proxied {
        proxy: Arc<dyn CollectionProxy>,
        n_written: u64,
    },
    Array,
    Bitset { n_bits: usize },
    Variant { n_written: Vec<u64> },
    Nullable {
        is_box: bool,
        n_written: u64,
        default_item: Box<Value>,
    },
    UntypedCollection { writer: Arc<CollectionWriter> },
    Cardinality { bits: u8 },
}

/// Cheap discriminant used for dispatch without borrowing the kind payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KindTag {
    Root,
    Leaf,
    String,
    Record,
    Enum,
    Atomic,
    Vector,
    Set,
    Proxied,
    Array,
    Bitset,
    Variant,
    Nullable,
    UntypedCollection,
    Cardinality,
}

impl FieldKind {
    fn tag(&self) -> KindTag {
        match self {
            FieldKind::Root => KindTag::Root,
            FieldKind::Leaf(_) => KindTag::Leaf,
            FieldKind::String { .. } => KindTag::String,
            FieldKind::Record(_) => KindTag::Record,
            FieldKind::Enum => KindTag::Enum,
            FieldKind::Atomic => KindTag::Atomic,
            FieldKind::Vector { .. } => KindTag::Vector,
            FieldKind::Set { .. } => KindTag::Set,
            FieldKind::Proxied { .. } => KindTag::Proxied,
            FieldKind::Array => KindTag::Array,
            FieldKind::Bitset { .. } => KindTag::Bitset,
            FieldKind::Variant { .. } => KindTag::Variant,
            FieldKind::Nullable { .. } => KindTag::Nullable,
            FieldKind::UntypedCollection { .. } => KindTag::UntypedCollection,
            FieldKind::Cardinality { .. } => KindTag::Cardinality,
        }
    }

    /// Deep copy with per-cluster write counters reset.
    fn fresh_clone(&self) -> FieldKind {
        let mut kind = self.clone();
        match &mut kind {
            FieldKind::String { n_written }
            | FieldKind::Vector { n_written }
            | FieldKind::Set { n_written }
            | FieldKind::Proxied { n_written, .. }
            | FieldKind::Nullable { n_written, .. } => *n_written = 0,
            FieldKind::Variant { n_written } => n_written.iter_mut().for_each(|n| *n = 0),
            _ => {}
        }
        kind
    }
}

/// A node of the schema tree: name, type, per-kind state, owned children
/// and owned columns.
pub struct Field {
    name: String,
    type_name: String,
    type_alias: Option<String>,
    structure: FieldStructure,
    n_repetitions: usize,
    traits: Traits,
    is_simple: bool,
    description: String,
    state: FieldState,
    on_disk_id: Option<FieldId>,
    on_disk_type_version: Option<u32>,
    representative: Option<Vec<ColumnType>>,
    read_callbacks: Vec<Option<ReadCallback>>,
    pub(crate) children: Vec<Field>,
    pub(crate) columns: SmallVec<[Column; 2]>,
    pub(crate) kind: FieldKind,
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

impl Field {
    pub(crate) fn build(
        name: &str,
        type_name: &str,
        structure: FieldStructure,
        kind: FieldKind,
        traits: Traits,
        children: Vec<Field>,
    ) -> Field {
        let is_simple = traits.is_mappable();
        Field {
            name: name.to_owned(),
            type_name: type_name.to_owned(),
            type_alias: None,
            structure,
            n_repetitions: 0,
            traits,
            is_simple,
            description: String::new(),
            state: FieldState::Unconnected,
            on_disk_id: None,
            on_disk_type_version: None,
            representative: None,
            read_callbacks: Vec::new(),
            children,
            columns: SmallVec::new(),
            kind,
        }
    }

    /// The anonymous record container at the top of a schema tree.
    pub fn root(children: Vec<Field>) -> Field {
        Field::build("", "", FieldStructure::Record, FieldKind::Root, Traits::NONE, children)
    }

    /// Parses `type_name` and manufactures the matching concrete field.
    pub fn create(name: &str, type_name: &str, resolver: &SharedResolver) -> Result<Field> {
        create::create_field(name, type_name, resolver)
    }

    /// Adds a subfield to the list of nested fields.
    pub fn attach(&mut self, child: Field) {
        self.children.push(child);
    }

    // --- accessors ---------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn type_alias(&self) -> Option<&str> {
        self.type_alias.as_deref()
    }

    pub(crate) fn set_type_alias(&mut self, alias: &str) {
        self.type_alias = Some(alias.to_owned());
    }

    pub fn structure(&self) -> FieldStructure {
        self.structure
    }

    pub fn n_repetitions(&self) -> usize {
        self.n_repetitions
    }

    pub(crate) fn set_n_repetitions(&mut self, n: usize) {
        self.n_repetitions = n;
    }

    pub fn traits(&self) -> Traits {
        self.traits
    }

    pub fn is_simple(&self) -> bool {
        self.is_simple
    }

    pub fn state(&self) -> FieldState {
        self.state
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = description.to_owned();
    }

    pub fn on_disk_id(&self) -> Option<FieldId> {
        self.on_disk_id
    }

    /// Sets the descriptor id this field binds to on connect-to-source.
    pub fn set_on_disk_id(&mut self, id: FieldId) -> Result<()> {
        field_ensure!(
            self.state == FieldState::Unconnected,
            StateViolation,
            "on-disk id of '{}' can only change while unconnected",
            self.name
        );
        self.on_disk_id = Some(id);
        Ok(())
    }

    /// Type version found in the descriptor; set by connect-to-source.
    pub fn on_disk_type_version(&self) -> Option<u32> {
        self.on_disk_type_version
    }

    /// Version of the in-memory type mapping (record types carry the
    /// registry version; everything else is 0).
    pub fn type_version(&self) -> u32 {
        match &self.kind {
            FieldKind::Record(layout) => layout.version,
            _ => 0,
        }
    }

    pub fn children(&self) -> &[Field] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Field] {
        &mut self.children
    }

    /// The column whose element index drives the fast paths; `None` for
    /// column-less fields (records, arrays, wrappers, the root).
    pub(crate) fn principal(&self) -> Result<&Column> {
        self.columns
            .first()
            .ok_or_else(|| field_err!(StateViolation, "field '{}' has no columns", self.name))
    }

    fn principal_mut(&mut self) -> Result<&mut Column> {
        let name = self.name.clone();
        self.columns
            .first_mut()
            .ok_or_else(|| field_err!(StateViolation, "field '{name}' has no columns"))
    }

    /// Number of elements in the principal column.
    pub fn n_elements(&self) -> u64 {
        self.columns.first().map(Column::n_elements).unwrap_or(0)
    }

    // --- values ------------------------------------------------------------

    /// A freshly constructed value of this field's shape. Ownership of the
    /// returned value is the owning handle; `append`/`read` bind to any
    /// value the caller provides.
    pub fn generate_value(&self) -> Value {
        match &self.kind {
            FieldKind::Root | FieldKind::Record(_) => {
                Value::Record(self.children.iter().map(Field::generate_value).collect())
            }
            FieldKind::Leaf(prim) => prim.default_value(),
            FieldKind::String { .. } => Value::Str(String::new()),
            FieldKind::Enum | FieldKind::Atomic => self.children[0].generate_value(),
            FieldKind::Vector { .. } => Value::Vector(Vec::new()),
            FieldKind::Set { .. } => Value::Set(Vec::new()),
            FieldKind::Proxied { proxy, .. } => proxy.new_value(),
            FieldKind::Array => Value::Array(
                std::iter::repeat_with(|| self.children[0].generate_value())
                    .take(self.n_repetitions)
                    .collect(),
            ),
            FieldKind::Bitset { n_bits } => Value::Bitset(crate::value::Bitset::new(*n_bits)),
            FieldKind::Variant { .. } => {
                Value::Variant(Some((0, Box::new(self.children[0].generate_value()))))
            }
            FieldKind::Nullable { .. } => Value::Nullable(None),
            FieldKind::UntypedCollection { .. } => Value::Index(0),
            FieldKind::Cardinality { bits: 32 } => Value::U32(0),
            FieldKind::Cardinality { .. } => Value::U64(0),
        }
    }

    /// Bytes a value of this field occupies in the equivalent C layout.
    pub fn value_size(&self) -> usize {
        match &self.kind {
            FieldKind::Root => 0,
            FieldKind::Leaf(prim) => prim.byte_size(),
            FieldKind::String { .. } => std::mem::size_of::<String>(),
            FieldKind::Record(layout) => layout.size,
            FieldKind::Enum | FieldKind::Atomic => self.children[0].value_size(),
            FieldKind::Vector { .. } | FieldKind::Set { .. } | FieldKind::Proxied { .. } => {
                std::mem::size_of::<Vec<Value>>()
            }
            FieldKind::Array => self.n_repetitions * self.children[0].value_size(),
            FieldKind::Bitset { n_bits } => n_bits.div_ceil(64) * 8,
            FieldKind::Variant { .. } => {
                let payload = self
                    .children
                    .iter()
                    .map(Field::value_size)
                    .max()
                    .unwrap_or(0);
                align_up(payload + 1, self.alignment())
            }
            FieldKind::Nullable { is_box: true, .. } => std::mem::size_of::<usize>(),
            FieldKind::Nullable { .. } => {
                let child = &self.children[0];
                align_up(child.value_size() + 1, child.alignment())
            }
            FieldKind::UntypedCollection { .. } => std::mem::size_of::<u64>(),
            FieldKind::Cardinality { bits } => usize::from(*bits) / 8,
        }
    }

    /// Alignment of the equivalent C layout.
    pub fn alignment(&self) -> usize {
        match &self.kind {
            FieldKind::Root => 1,
            FieldKind::Leaf(prim) => prim.byte_size(),
            FieldKind::String { .. } => std::mem::align_of::<String>(),
            FieldKind::Record(layout) => layout.max_align,
            FieldKind::Enum | FieldKind::Atomic => self.children[0].alignment(),
            FieldKind::Vector { .. } | FieldKind::Set { .. } => {
                std::mem::align_of::<Vec<Value>>()
            }
            // element layout is only known to the proxy; be conservative
            FieldKind::Proxied { .. } => 16,
            FieldKind::Array => self.children[0].alignment(),
            FieldKind::Bitset { .. } => std::mem::align_of::<u64>(),
            FieldKind::Variant { .. } => self
                .children
                .iter()
                .map(Field::alignment)
                .max()
                .unwrap_or(1),
            FieldKind::Nullable { is_box: true, .. } => std::mem::align_of::<usize>(),
            FieldKind::Nullable { .. } => self.children[0].alignment(),
            FieldKind::UntypedCollection { .. } => std::mem::align_of::<u64>(),
            FieldKind::Cardinality { bits } => usize::from(*bits) / 8,
        }
    }

    // --- read callbacks ----------------------------------------------------

    /// Registers a function invoked after every non-fast-path read, in
    /// registration order. Returns the id used for removal.
    pub fn add_read_callback(&mut self, callback: ReadCallback) -> usize {
        self.read_callbacks.push(Some(callback));
        self.recompute_simple();
        self.read_callbacks.len() - 1
    }

    pub fn remove_read_callback(&mut self, id: usize) -> Result<()> {
        match self.read_callbacks.get_mut(id) {
            Some(slot @ Some(_)) => {
                *slot = None;
                self.recompute_simple();
                Ok(())
            }
            _ => field_bail!(InvalidArgument, "no read callback with id {id}"),
        }
    }

    pub fn has_read_callbacks(&self) -> bool {
        self.read_callbacks.iter().any(Option::is_some)
    }

    fn recompute_simple(&mut self) {
        self.is_simple = self.traits.is_mappable() && !self.has_read_callbacks();
    }

    fn invoke_read_callbacks(&self, target: &mut Value) {
        for callback in self.read_callbacks.iter().flatten() {
            callback(target);
        }
    }

    // --- write path --------------------------------------------------------

    /// Writes `from` into this field's columns; returns the number of
    /// uncompressed bytes written.
    pub fn append(&mut self, from: &Value) -> Result<usize> {
        if self.kind.tag() != KindTag::Root {
            field_ensure!(
                self.state == FieldState::ConnectedToSink,
                StateViolation,
                "append on '{}' requires a sink connection",
                self.name
            );
        }
        if self.traits.is_mappable() {
            return self.principal_mut()?.append_scalar(from);
        }
        self.append_impl(from)
    }

    fn append_impl(&mut self, from: &Value) -> Result<usize> {
        match self.kind.tag() {
            KindTag::Root | KindTag::Record => self.record_append(from),
            KindTag::Enum | KindTag::Atomic => self.children[0].append(from),
            KindTag::Leaf => self.principal_mut()?.append_scalar(from),
            KindTag::String => self.string_append(from),
            KindTag::Vector => self.vector_append(from),
            KindTag::Set => self.set_append(from),
            KindTag::Proxied => self.proxied_append(from),
            KindTag::Array => self.array_append(from),
            KindTag::Bitset => self.bitset_append(from),
            KindTag::Variant => self.variant_append(from),
            KindTag::Nullable => self.nullable_append(from),
            KindTag::UntypedCollection => self.untyped_collection_append(from),
            KindTag::Cardinality => {
                field_bail!(Unsupported, "cardinality fields are read-only")
            }
        }
    }

    // --- read path ---------------------------------------------------------

    /// Populates `to` with the value at the global entry index.
    pub fn read(&self, global: EntryIndex, to: &mut Value) -> Result<()> {
        if self.kind.tag() != KindTag::Root {
            field_ensure!(
                self.state == FieldState::ConnectedToSource,
                StateViolation,
                "read on '{}' requires a source connection",
                self.name
            );
        }
        if self.is_simple {
            return self.principal()?.read_scalar(global, to);
        }
        if self.traits.is_mappable() {
            self.principal()?.read_scalar(global, to)?;
        } else {
            self.read_impl(global, to)?;
        }
        self.invoke_read_callbacks(to);
        Ok(())
    }

    /// Populates `to` with the value at a cluster-local index.
    pub fn read_cluster(&self, index: ClusterIndex, to: &mut Value) -> Result<()> {
        if self.kind.tag() != KindTag::Root {
            field_ensure!(
                self.state == FieldState::ConnectedToSource,
                StateViolation,
                "read on '{}' requires a source connection",
                self.name
            );
        }
        if self.is_simple {
            return self.principal()?.read_scalar_cluster(index, to);
        }
        if self.traits.is_mappable() {
            self.principal()?.read_scalar_cluster(index, to)?;
        } else {
            self.read_cluster_impl(index, to)?;
        }
        self.invoke_read_callbacks(to);
        Ok(())
    }

    pub(crate) fn read_impl(&self, global: EntryIndex, to: &mut Value) -> Result<()> {
        match self.kind.tag() {
            KindTag::Root | KindTag::Record => self.record_read(global, to),
            KindTag::Enum | KindTag::Atomic => self.children[0].read(global, to),
            KindTag::Leaf => self.principal()?.read_scalar(global, to),
            KindTag::String => self.string_read(global, to),
            KindTag::Vector | KindTag::Set | KindTag::Proxied => {
                let (start, size) = self.principal()?.collection_info(global)?;
                self.collection_read(start, size, to)
            }
            KindTag::Array => self.array_read(global, to),
            KindTag::Bitset => self.bitset_read(global, to),
            KindTag::Variant => self.variant_read(global, to),
            KindTag::Nullable => self.nullable_read(global, to),
            KindTag::Cardinality => self.cardinality_read(global, to),
            KindTag::UntypedCollection => {
                field_bail!(Unsupported, "untyped collection fields are write-only")
            }
        }
    }

    pub(crate) fn read_cluster_impl(&self, index: ClusterIndex, to: &mut Value) -> Result<()> {
        match self.kind.tag() {
            KindTag::Root | KindTag::Record => self.record_read_cluster(index, to),
            KindTag::Enum | KindTag::Atomic => self.children[0].read_cluster(index, to),
            KindTag::Array => self.array_read_cluster(index, to),
            KindTag::Bitset => self.bitset_read_cluster(index, to),
            KindTag::Vector | KindTag::Set | KindTag::Proxied => {
                let (start, size) = self.principal()?.collection_info_cluster(index)?;
                self.collection_read(start, size, to)
            }
            KindTag::Cardinality => self.cardinality_read_cluster(index, to),
            // remaining kinds translate through their principal column
            _ => {
                let global = self.principal()?.to_global(index)?;
                self.read_impl(global, to)
            }
        }
    }

    // --- bulk --------------------------------------------------------------

    /// A reusable bulk handle over this field. The handle is initially
    /// empty; the first `read_bulk` constructs the value array.
    pub fn generate_bulk(&self) -> Bulk<'_> {
        Bulk::new(self)
    }

    /// Fills missing requested slots; see [`BulkSpec`]. Returns the number
    /// of newly available values, or [`ALL_SET`] when the whole range was
    /// read regardless of masks.
    pub(crate) fn read_bulk(&self, spec: BulkSpec<'_>) -> Result<usize> {
        if self.is_simple {
            return self.read_bulk_simple(spec);
        }
        self.read_bulk_impl(spec)
    }

    fn read_bulk_impl(&self, spec: BulkSpec<'_>) -> Result<usize> {
        match self.kind.tag() {
            KindTag::Vector | KindTag::Set => {
                if self.children[0].is_simple {
                    return self.collection_read_bulk(spec);
                }
                self.read_bulk_default(spec)
            }
            KindTag::Cardinality => self.cardinality_read_bulk(spec),
            _ => self.read_bulk_default(spec),
        }
    }

    /// Loop over the required range and read values that are required and
    /// not already present.
    fn read_bulk_default(&self, mut spec: BulkSpec<'_>) -> Result<usize> {
        let mut n_new = 0;
        for k in 0..spec.count {
            if !spec.mask_req[k] || spec.mask_avail[k] {
                continue;
            }
            self.read_cluster(spec.first.offset_by(k as u64), &mut spec.values[k])?;
            spec.mask_avail[k] = true;
            n_new += 1;
        }
        Ok(n_new)
    }

    /// Vectorized path for simple fields: one contiguous column read, masks
    /// ignored.
    fn read_bulk_simple(&self, mut spec: BulkSpec<'_>) -> Result<usize> {
        let column = self.principal()?;
        let elem_size = column.packed_size();
        let mut buf = vec![0u8; spec.count * elem_size];
        column.read_v(spec.first, spec.count, &mut buf)?;
        for (k, value) in spec.values.iter_mut().enumerate() {
            crate::encoding::element::unpack_scalar(
                column.column_type(),
                &buf[k * elem_size..(k + 1) * elem_size],
                value,
            )?;
        }
        spec.mask_avail.fill(true);
        Ok(ALL_SET)
    }

    // --- splitting ---------------------------------------------------------

    /// Non-owning handles to the direct child values inside `value`: all
    /// elements of a collection, the active alternative of a variant, the
    /// present item of a nullable, nothing for leaves.
    pub fn split_value<'a>(&'a self, value: &'a Value) -> Result<Vec<(&'a Field, &'a Value)>> {
        match (&self.kind, value) {
            (FieldKind::Root | FieldKind::Record(_), Value::Record(items)) => {
                field_ensure!(
                    items.len() == self.children.len(),
                    InvalidArgument,
                    "record value has {} members, field '{}' has {}",
                    items.len(),
                    self.name,
                    self.children.len()
                );
                Ok(self.children.iter().zip(items.iter()).collect())
            }
            (FieldKind::Vector { .. }, Value::Vector(items))
            | (FieldKind::Set { .. }, Value::Set(items))
            | (FieldKind::Array, Value::Array(items)) => {
                Ok(items.iter().map(|item| (&self.children[0], item)).collect())
            }
            (FieldKind::Proxied { proxy, .. }, collection) => Ok(proxy
                .items(collection)?
                .map(|item| (&self.children[0], item))
                .collect()),
            (FieldKind::Variant { .. }, Value::Variant(active)) => match active {
                None => Ok(Vec::new()),
                Some((tag, item)) => {
                    let child = self.children.get(*tag as usize).ok_or_else(|| {
                        field_err!(
                            InvalidArgument,
                            "variant value selects alternative {tag}, field '{}' has {}",
                            self.name,
                            self.children.len()
                        )
                    })?;
                    Ok(vec![(child, item.as_ref())])
                }
            },
            (FieldKind::Nullable { .. }, Value::Nullable(item)) => Ok(item
                .iter()
                .map(|item| (&self.children[0], item.as_ref()))
                .collect()),
            (FieldKind::Enum | FieldKind::Atomic, value) => {
                Ok(vec![(&self.children[0], value)])
            }
            (
                FieldKind::Leaf(_)
                | FieldKind::String { .. }
                | FieldKind::Bitset { .. }
                | FieldKind::Cardinality { .. }
                | FieldKind::UntypedCollection { .. },
                _,
            ) => Ok(Vec::new()),
            (_, value) => field_bail!(
                InvalidArgument,
                "cannot split a {} value on field '{}'",
                value.kind_name(),
                self.name
            ),
        }
    }

    // --- cluster commit ----------------------------------------------------

    /// Flushes column data at a cluster boundary and resets per-cluster
    /// counters, recursing into children. Skipping this at a boundary
    /// corrupts subsequent cluster offsets.
    pub fn commit_cluster(&mut self) -> Result<()> {
        if self.kind.tag() != KindTag::Root {
            field_ensure!(
                self.state == FieldState::ConnectedToSink,
                StateViolation,
                "commit on '{}' requires a sink connection",
                self.name
            );
            for column in &mut self.columns {
                column.commit_cluster()?;
            }
            self.commit_cluster_impl();
            tracing::debug!(
                field = %self.name,
                elements = self.n_elements(),
                "committed cluster"
            );
        }
        for child in &mut self.children {
            child.commit_cluster()?;
        }
        Ok(())
    }

    fn commit_cluster_impl(&mut self) {
        match &mut self.kind {
            FieldKind::String { n_written }
            | FieldKind::Vector { n_written }
            | FieldKind::Set { n_written }
            | FieldKind::Proxied { n_written, .. }
            | FieldKind::Nullable { n_written, .. } => *n_written = 0,
            FieldKind::Variant { n_written } => n_written.iter_mut().for_each(|n| *n = 0),
            FieldKind::UntypedCollection { writer } => writer.reset(),
            _ => {}
        }
    }

    // --- representation selection ------------------------------------------

    /// The column representations this field kind declares; the first
    /// serialization entry is the write default.
    pub fn column_representations(&self) -> ColumnRepresentations {
        repr::representations_for(self)
    }

    /// The representation used for writing: the fixed one if
    /// `set_representative` was called, otherwise the default.
    pub fn representative(&self) -> Vec<ColumnType> {
        self.representative.clone().unwrap_or_else(|| {
            let representations = self.column_representations();
            if representations.serialization_types().is_empty() {
                Vec::new()
            } else {
                representations.serialization_default().to_vec()
            }
        })
    }

    pub fn has_default_representative(&self) -> bool {
        self.representative.is_none()
    }

    /// Fixes the column representation. Only possible before connecting,
    /// and only to a declared serialization representation.
    pub fn set_representative(&mut self, representative: &[ColumnType]) -> Result<()> {
        field_ensure!(
            self.state == FieldState::Unconnected,
            StateViolation,
            "representation of '{}' can only change while unconnected",
            self.name
        );
        let representations = self.column_representations();
        field_ensure!(
            representations
                .serialization_types()
                .iter()
                .any(|r| r[..] == *representative),
            InvalidArgument,
            "representation {representative:?} is not declared by field '{}'",
            self.name
        );
        self.representative = Some(representative.to_vec());
        Ok(())
    }

    // --- connect -----------------------------------------------------------

    /// Connects this field (and its subtree) to a page sink for writing.
    /// `first_entry` is the global index of the first entry this field will
    /// see data for.
    pub fn connect_sink(&mut self, sink: &SharedSink, first_entry: EntryIndex) -> Result<()> {
        self.connect_sink_inner(sink, first_entry, None)
    }

    fn connect_sink_inner(
        &mut self,
        sink: &SharedSink,
        first_entry: EntryIndex,
        parent: Option<FieldId>,
    ) -> Result<()> {
        if self.kind.tag() == KindTag::Root {
            for child in &mut self.children {
                child.connect_sink_inner(sink, first_entry, None)?;
            }
            return Ok(());
        }
        field_ensure!(
            self.state == FieldState::Unconnected,
            StateViolation,
            "field '{}' is already connected",
            self.name
        );
        if self.kind.tag() == KindTag::Cardinality {
            field_bail!(Unsupported, "cardinality fields must only be used for reading");
        }

        let options = sink.lock().options();
        let id = sink
            .lock()
            .register_field(parent, &self.name, &self.type_name, self.type_version());
        self.on_disk_id = Some(id);

        let representative = self.adjusted_representative(&options);
        for (index, ty) in representative.iter().enumerate() {
            self.columns.push(Column::connect_sink(
                *ty,
                index as u32,
                id,
                first_entry,
                sink,
            )?);
        }
        self.state = FieldState::ConnectedToSink;
        tracing::debug!(
            field = %self.name,
            ty = %self.type_name,
            columns = ?representative,
            "connected to sink"
        );

        for child in &mut self.children {
            child.connect_sink_inner(sink, first_entry, Some(id))?;
        }
        Ok(())
    }

    /// The representation to write, adjusted to the sink's options: with
    /// compression or split encoding off, split column types fall back to
    /// their plain counterparts element-wise.
    fn adjusted_representative(&self, options: &WriteOptions) -> Vec<ColumnType> {
        let representative = self.representative();
        if options.split_allowed() {
            return representative;
        }
        let adjusted: Vec<ColumnType> = representative.iter().map(|ty| ty.to_plain()).collect();
        if adjusted != representative {
            tracing::debug!(
                field = %self.name,
                from = ?representative,
                to = ?adjusted,
                "adjusted column representation"
            );
        }
        adjusted
    }

    /// Connects this field (and its subtree) to a page source for reading.
    /// Fields without a bound on-disk id are left unconnected; reads leave
    /// their slots at the default, which is how schema-evolved members that
    /// have no on-disk counterpart get filled by read callbacks.
    pub fn connect_source(&mut self, source: &SharedSource) -> Result<()> {
        if self.kind.tag() == KindTag::Root {
            for child in &mut self.children {
                child.connect_source(source)?;
            }
            return Ok(());
        }
        field_ensure!(
            self.state == FieldState::Unconnected,
            StateViolation,
            "field '{}' is already connected",
            self.name
        );
        if self.kind.tag() == KindTag::UntypedCollection {
            field_bail!(Unsupported, "untyped collection fields are write-only");
        }
        let Some(id) = self.on_disk_id else {
            return Ok(());
        };

        let representations = self.column_representations();
        if !representations.deserialization_types().is_empty() {
            let on_disk = source.lock().lookup_columns(id)?;
            let on_disk_types: Vec<ColumnType> = on_disk.iter().map(|(ty, _)| *ty).collect();
            let matched = representations
                .deserialization_types()
                .iter()
                .find(|r| r[..] == on_disk_types[..])
                .ok_or_else(|| {
                    field_err!(
                        SchemaMismatch,
                        "on-disk columns {on_disk_types:?} match no representation of '{}' ({})",
                        self.name,
                        self.type_name
                    )
                })?
                .clone();
            self.representative = Some(matched);
            for (index, (ty, handle)) in on_disk.iter().enumerate() {
                self.columns
                    .push(Column::connect_source(*ty, index as u32, *handle, source));
            }
        }
        self.on_disk_type_version = Some(source.lock().lookup_type_version(id)?);
        self.state = FieldState::ConnectedToSource;
        tracing::debug!(field = %self.name, ty = %self.type_name, "connected to source");

        for child in &mut self.children {
            child.connect_source(source)?;
        }
        self.on_connect_source()
    }

    /// Post-connect hook; record fields use it to install schema-evolution
    /// read callbacks.
    fn on_connect_source(&mut self) -> Result<()> {
        if self.kind.tag() == KindTag::Record {
            return self.record_on_connect_source();
        }
        Ok(())
    }

    /// Walks the tree and assigns on-disk ids by matching descriptor
    /// parentage and names. Fields absent from the descriptor keep no id.
    pub fn bind_on_disk_ids(&mut self, descriptor: &Descriptor) {
        fn walk(field: &mut Field, parent: Option<FieldId>, descriptor: &Descriptor) {
            let id = descriptor
                .fields()
                .find(|f| f.parent == parent && f.name == field.name)
                .map(|f| f.id);
            if let Some(id) = id {
                field.on_disk_id = Some(id);
            }
            for child in &mut field.children {
                walk(child, id, descriptor);
            }
        }
        if self.kind.tag() == KindTag::Root {
            for child in &mut self.children {
                walk(child, None, descriptor);
            }
        } else {
            walk(self, None, descriptor);
        }
    }

    // --- clone & equivalence -----------------------------------------------

    /// Deep copy of the schema under a new name: children, traits,
    /// representation choice and description are kept, the on-disk id is
    /// preserved, the state resets to unconnected and columns are not
    /// copied. Read callbacks do not survive the clone.
    pub fn clone_as(&self, new_name: &str) -> Result<Field> {
        create::ensure_valid_name(new_name)?;
        Ok(self.clone_internal(new_name))
    }

    pub(crate) fn clone_internal(&self, new_name: &str) -> Field {
        let mut copy = Field::build(
            new_name,
            &self.type_name,
            self.structure,
            self.kind.fresh_clone(),
            self.traits,
            self.children
                .iter()
                .map(|c| c.clone_internal(&c.name))
                .collect(),
        );
        copy.type_alias = self.type_alias.clone();
        copy.n_repetitions = self.n_repetitions;
        copy.description = self.description.clone();
        copy.on_disk_id = self.on_disk_id;
        copy.representative = self.representative.clone();
        copy
    }

    /// Structural equivalence: same type, structure and children, ignoring
    /// names, connection state and descriptions.
    pub fn equivalent(&self, other: &Field) -> bool {
        self.type_name == other.type_name
            && self.structure == other.structure
            && self.n_repetitions == other.n_repetitions
            && self.kind.tag() == other.kind.tag()
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(other.children.iter())
                .all(|(a, b)| a.equivalent(b))
    }

    // --- iteration ---------------------------------------------------------

    /// Depth-first pre-order iteration over the strict descendants of this
    /// field; every field of the subtree is visited exactly once.
    pub fn iter_schema(&self) -> SchemaIter<'_> {
        SchemaIter::new(self)
    }

    // --- collection helpers -------------------------------------------------

    /// For collection-like fields: cluster-local index of the first item
    /// and number of items of the collection at `global`.
    pub fn collection_info(&self, global: EntryIndex) -> Result<(ClusterIndex, u64)> {
        self.principal()?.collection_info(global)
    }
}

/// Rounds `offset` up to the next multiple of `align`.
pub(crate) fn align_up(offset: usize, align: usize) -> usize {
    if align <= 1 {
        offset
    } else {
        offset.div_ceil(align) * align
    }
}
