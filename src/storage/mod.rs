//! # Page Storage Interface
//!
//! Fields never touch pages directly; they talk to a page sink (writing) or
//! a page source (reading) through the narrow traits defined here. The
//! engine ships one implementation, [`memory::MemoryPageStore`], which backs
//! the test suite and doubles as the reference for the encoding semantics.
//! File containers are explicitly out of scope.
//!
//! A sink and source pair is shared by every column of a connected field
//! tree, so fields hold `Arc<parking_lot::Mutex<dyn ...>>` clones
//! ([`SharedSink`], [`SharedSource`]). Field trees are single-owner; the
//! lock only arbitrates between columns of the same tree.

pub mod memory;

use std::sync::Arc;

use eyre::Result;
use parking_lot::Mutex;

use crate::descriptor::Descriptor;
use crate::types::{ClusterIndex, ColumnHandle, ColumnType, EntryIndex, FieldId};

/// Knobs a sink exposes to connecting fields. If compression or split
/// encoding is off, fields swap split-encoded column types for their plain
/// counterparts before creating columns.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    pub compression_enabled: bool,
    pub use_split_encoding: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression_enabled: true,
            use_split_encoding: true,
        }
    }
}

impl WriteOptions {
    /// Whether split column types survive representation adjustment.
    pub fn split_allowed(&self) -> bool {
        self.compression_enabled && self.use_split_encoding
    }
}

/// A run of decoded elements handed out by [`PageSource::map_v`]: the
/// containing page plus the offset of the requested element. Valid until
/// dropped; the page data is shared, not copied.
#[derive(Debug, Clone)]
pub struct PageSlice {
    pub page: Arc<[u8]>,
    pub elem_offset: usize,
    pub elem_size: usize,
    pub n_items: u64,
}

impl PageSlice {
    /// Canonical bytes from the requested element to the end of the page.
    pub fn bytes(&self) -> &[u8] {
        &self.page[self.elem_offset * self.elem_size..]
    }
}

/// Write side of page storage.
pub trait PageSink: Send {
    fn options(&self) -> WriteOptions;

    /// Registers a field in the descriptor; returns its on-disk id.
    fn register_field(
        &mut self,
        parent: Option<FieldId>,
        name: &str,
        type_name: &str,
        type_version: u32,
    ) -> FieldId;

    fn create_column(
        &mut self,
        field: FieldId,
        ty: ColumnType,
        first_entry: EntryIndex,
    ) -> Result<ColumnHandle>;

    /// Appends one packed element (canonical little-endian form).
    fn append(&mut self, column: ColumnHandle, packed: &[u8]) -> Result<()>;

    /// Seals the column's staged elements into a page and starts the next
    /// cluster.
    fn commit_cluster(&mut self, column: ColumnHandle) -> Result<()>;
}

/// Read side of page storage.
pub trait PageSource: Send {
    fn descriptor(&self) -> Descriptor;

    /// Columns of an on-disk field, in column order.
    fn lookup_columns(&self, field: FieldId) -> Result<Vec<(ColumnType, ColumnHandle)>>;

    fn lookup_type_version(&self, field: FieldId) -> Result<u32>;

    fn n_elements(&self, column: ColumnHandle) -> Result<u64>;

    fn read(&mut self, column: ColumnHandle, global: EntryIndex, out: &mut [u8]) -> Result<()>;

    fn read_v(
        &mut self,
        column: ColumnHandle,
        global: EntryIndex,
        count: usize,
        out: &mut [u8],
    ) -> Result<()>;

    /// For offset columns: the cluster-local index of the first item of the
    /// collection at `global`, and the collection's size.
    fn collection_info(
        &mut self,
        column: ColumnHandle,
        global: EntryIndex,
    ) -> Result<(ClusterIndex, u64)>;

    /// Zero-copy access to the decoded page containing `global`.
    fn map_v(&mut self, column: ColumnHandle, global: EntryIndex) -> Result<PageSlice>;

    fn to_cluster(&self, column: ColumnHandle, global: EntryIndex) -> Result<ClusterIndex>;

    fn to_global(&self, column: ColumnHandle, index: ClusterIndex) -> Result<EntryIndex>;
}

/// Sink handle shared by the columns of one field tree.
pub type SharedSink = Arc<Mutex<dyn PageSink>>;

/// Source handle shared by the columns of one field tree.
pub type SharedSource = Arc<Mutex<dyn PageSource>>;
