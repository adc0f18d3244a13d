//! # Column Abstraction
//!
//! A `Column` is one typed element stream owned by a field: it packs scalar
//! values into canonical element bytes on append, unpacks them on read, and
//! forwards offset/switch helpers to the page store. Columns are created at
//! connection time (one per entry of the field's chosen representation) and
//! connected to either a sink or a source, never both.
//!
//! The column with index 0 is the field's principal column: its element
//! index drives the field's fast paths and global-to-cluster translation.

use eyre::Result;

use crate::encoding::element;
use crate::storage::{PageSlice, SharedSink, SharedSource};
use crate::types::{ClusterIndex, ColumnHandle, ColumnType, EntryIndex, FieldId, SwitchValue};
use crate::value::Value;
use crate::{field_bail, field_err};

pub struct Column {
    ty: ColumnType,
    index: u32,
    handle: ColumnHandle,
    n_appended: u64,
    sink: Option<SharedSink>,
    source: Option<SharedSource>,
}

impl Column {
    /// Creates the column in the sink and binds to it.
    pub(crate) fn connect_sink(
        ty: ColumnType,
        index: u32,
        field: FieldId,
        first_entry: EntryIndex,
        sink: &SharedSink,
    ) -> Result<Self> {
        let handle = sink.lock().create_column(field, ty, first_entry)?;
        Ok(Self {
            ty,
            index,
            handle,
            n_appended: 0,
            sink: Some(sink.clone()),
            source: None,
        })
    }

    /// Binds to an existing on-disk column of the source.
    pub(crate) fn connect_source(
        ty: ColumnType,
        index: u32,
        handle: ColumnHandle,
        source: &SharedSource,
    ) -> Self {
        Self {
            ty,
            index,
            handle,
            n_appended: 0,
            sink: None,
            source: Some(source.clone()),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        self.ty
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Size in bytes of one packed element.
    pub fn packed_size(&self) -> usize {
        self.ty.packed_size()
    }

    fn sink(&self) -> Result<&SharedSink> {
        self.sink
            .as_ref()
            .ok_or_else(|| field_err!(StateViolation, "column is not connected to a sink"))
    }

    fn source(&self) -> Result<&SharedSource> {
        self.source
            .as_ref()
            .ok_or_else(|| field_err!(StateViolation, "column is not connected to a source"))
    }

    /// Number of elements this column has seen: appended when writing,
    /// committed on disk when reading.
    pub fn n_elements(&self) -> u64 {
        if let Some(source) = &self.source {
            source.lock().n_elements(self.handle).unwrap_or(0)
        } else {
            self.n_appended
        }
    }

    pub(crate) fn append_scalar(&mut self, value: &Value) -> Result<usize> {
        let mut buf = [0u8; 12];
        let size = self.packed_size();
        element::pack_scalar(self.ty, value, &mut buf[..size])?;
        self.sink()?.lock().append(self.handle, &buf[..size])?;
        self.n_appended += 1;
        Ok(size)
    }

    pub(crate) fn append_index(&mut self, offset: u64) -> Result<usize> {
        let mut buf = [0u8; 12];
        let size = self.packed_size();
        element::pack_index(self.ty, offset, &mut buf[..size])?;
        self.sink()?.lock().append(self.handle, &buf[..size])?;
        self.n_appended += 1;
        Ok(size)
    }

    pub(crate) fn append_switch(&mut self, switch: SwitchValue) -> Result<usize> {
        if self.ty != ColumnType::Switch {
            field_bail!(InvalidArgument, "switch append on a {} column", self.ty);
        }
        let mut buf = [0u8; 12];
        element::pack_switch(switch, &mut buf);
        self.sink()?.lock().append(self.handle, &buf)?;
        self.n_appended += 1;
        Ok(buf.len())
    }

    /// Appends one raw pre-packed element (string payload bytes).
    pub(crate) fn append_raw(&mut self, packed: &[u8]) -> Result<usize> {
        self.sink()?.lock().append(self.handle, packed)?;
        self.n_appended += 1;
        Ok(packed.len())
    }

    pub(crate) fn read_scalar(&self, global: EntryIndex, dest: &mut Value) -> Result<()> {
        let mut buf = [0u8; 12];
        let size = self.packed_size();
        self.source()?.lock().read(self.handle, global, &mut buf[..size])?;
        element::unpack_scalar(self.ty, &buf[..size], dest)
    }

    pub(crate) fn read_scalar_cluster(&self, index: ClusterIndex, dest: &mut Value) -> Result<()> {
        let global = self.to_global(index)?;
        self.read_scalar(global, dest)
    }

    pub(crate) fn read_switch(&self, global: EntryIndex) -> Result<SwitchValue> {
        let mut buf = [0u8; 12];
        self.source()?.lock().read(self.handle, global, &mut buf)?;
        element::unpack_switch(&buf)
    }

    /// Contiguous read of `count` canonical elements starting at a
    /// cluster-local index.
    pub(crate) fn read_v(&self, first: ClusterIndex, count: usize, out: &mut [u8]) -> Result<()> {
        let global = self.to_global(first)?;
        self.source()?.lock().read_v(self.handle, global, count, out)
    }

    pub(crate) fn collection_info(&self, global: EntryIndex) -> Result<(ClusterIndex, u64)> {
        self.source()?.lock().collection_info(self.handle, global)
    }

    pub(crate) fn collection_info_cluster(
        &self,
        index: ClusterIndex,
    ) -> Result<(ClusterIndex, u64)> {
        let global = self.to_global(index)?;
        self.collection_info(global)
    }

    pub(crate) fn map_v_cluster(&self, index: ClusterIndex) -> Result<PageSlice> {
        let global = self.to_global(index)?;
        self.source()?.lock().map_v(self.handle, global)
    }

    pub(crate) fn to_global(&self, index: ClusterIndex) -> Result<EntryIndex> {
        self.source()?.lock().to_global(self.handle, index)
    }

    pub(crate) fn to_cluster(&self, global: EntryIndex) -> Result<ClusterIndex> {
        self.source()?.lock().to_cluster(self.handle, global)
    }

    /// Seals the current cluster in the sink.
    pub(crate) fn commit_cluster(&mut self) -> Result<()> {
        self.sink()?.lock().commit_cluster(self.handle)
    }
}
