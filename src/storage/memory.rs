//! # In-Memory Page Store
//!
//! Reference implementation of [`PageSink`] and [`PageSource`] over heap
//! pages. One store serves first as the sink of a writing field tree, then
//! as the source of any number of (sequential) reading trees.
//!
//! ## Page Blob Layout
//!
//! Each cluster commit seals a column's staged elements into one page blob:
//!
//! ```text
//! +------------------+---------------------------+
//! | PageHeader (16B) | encoded payload           |
//! +------------------+---------------------------+
//! ```
//!
//! | Field | Type | Description |
//! |-------|------|-------------|
//! | `n_elements` | `u64` LE | elements in this page |
//! | `payload_len` | `u32` LE | encoded payload bytes |
//! | `reserved` | `u32` LE | zero |
//!
//! The payload carries the page-level encoding of the column type (split
//! interleaving, bit packing; see [`crate::encoding::split`]). Decoding is
//! lazy: the first read of a page materializes its canonical form, which is
//! then shared zero-copy through [`PageSlice`].
//!
//! Cluster ids are page ordinals: every `commit_cluster` produces exactly
//! one page per column, empty clusters included, so cluster ids line up
//! across all columns of a tree as long as commits reach every column.

use std::sync::Arc;

use eyre::Result;
use parking_lot::Mutex;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::{PageSink, PageSource, PageSlice, WriteOptions};
use crate::descriptor::{ColumnDescriptor, Descriptor, FieldDescriptor};
use crate::encoding::{element, split};
use crate::types::{ClusterIndex, ColumnHandle, ColumnType, EntryIndex, FieldId};
use crate::{field_bail, field_err};

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
struct PageHeader {
    n_elements: U64,
    payload_len: U32,
    reserved: U32,
}

const PAGE_HEADER_SIZE: usize = std::mem::size_of::<PageHeader>();

struct Page {
    first_element: u64,
    n_elements: u64,
    blob: Vec<u8>,
    decoded: Option<Arc<[u8]>>,
}

struct ColumnState {
    ty: ColumnType,
    staged: Vec<u8>,
    staged_elements: u64,
    pages: Vec<Page>,
    n_committed: u64,
}

impl ColumnState {
    /// Bytes per element in canonical (decoded) form; bit elements occupy
    /// one byte until page encoding packs them.
    fn elem_size(&self) -> usize {
        self.ty.packed_size()
    }

    fn page_of(&self, global: u64) -> Result<usize> {
        if global >= self.n_committed {
            field_bail!(
                Io,
                "element {global} not committed (column has {} committed elements)",
                self.n_committed
            );
        }
        Ok(self
            .pages
            .partition_point(|p| p.first_element + p.n_elements <= global))
    }
}

/// Heap-backed page storage with a live descriptor.
pub struct MemoryPageStore {
    options: WriteOptions,
    columns: Vec<ColumnState>,
    descriptor: Descriptor,
    next_field_id: FieldId,
}

impl MemoryPageStore {
    pub fn new(options: WriteOptions) -> Self {
        Self {
            options,
            columns: Vec::new(),
            descriptor: Descriptor::default(),
            next_field_id: 1,
        }
    }

    /// Store wrapped for sharing between a sink-side and a source-side tree.
    pub fn shared(options: WriteOptions) -> Arc<Mutex<MemoryPageStore>> {
        Arc::new(Mutex::new(Self::new(options)))
    }

    fn column(&self, handle: ColumnHandle) -> Result<&ColumnState> {
        self.columns
            .get(handle as usize)
            .ok_or_else(|| field_err!(InvalidArgument, "unknown column handle {handle}"))
    }

    fn column_mut(&mut self, handle: ColumnHandle) -> Result<&mut ColumnState> {
        self.columns
            .get_mut(handle as usize)
            .ok_or_else(|| field_err!(InvalidArgument, "unknown column handle {handle}"))
    }

    fn decoded_page(&mut self, handle: ColumnHandle, page: usize) -> Result<Arc<[u8]>> {
        let col = self.column_mut(handle)?;
        if let Some(decoded) = &col.pages[page].decoded {
            return Ok(decoded.clone());
        }
        let ty = col.ty;
        let p = &col.pages[page];
        let header = PageHeader::ref_from_bytes(&p.blob[..PAGE_HEADER_SIZE])
            .map_err(|_| field_err!(Io, "truncated page header"))?;
        let payload = &p.blob[PAGE_HEADER_SIZE..];
        if payload.len() != header.payload_len.get() as usize {
            field_bail!(Io, "page payload length mismatch");
        }
        let raw = split::decode_page(ty, payload, header.n_elements.get() as usize);
        let decoded: Arc<[u8]> = Arc::from(raw.into_boxed_slice());
        col.pages[page].decoded = Some(decoded.clone());
        Ok(decoded)
    }

    fn read_offset_element(
        &mut self,
        handle: ColumnHandle,
        global: u64,
    ) -> Result<u64> {
        let ty = self.column(handle)?.ty;
        let elem_size = ty.packed_size();
        let page = self.column(handle)?.page_of(global)?;
        let first = self.columns[handle as usize].pages[page].first_element;
        let decoded = self.decoded_page(handle, page)?;
        let at = (global - first) as usize * elem_size;
        element::unpack_index(ty, &decoded[at..at + elem_size])
    }
}

impl PageSink for MemoryPageStore {
    fn options(&self) -> WriteOptions {
        self.options
    }

    fn register_field(
        &mut self,
        parent: Option<FieldId>,
        name: &str,
        type_name: &str,
        type_version: u32,
    ) -> FieldId {
        let id = self.next_field_id;
        self.next_field_id += 1;
        self.descriptor.add_field(FieldDescriptor {
            id,
            parent,
            name: name.to_owned(),
            type_name: type_name.to_owned(),
            type_version,
            columns: Vec::new(),
        });
        id
    }

    fn create_column(
        &mut self,
        field: FieldId,
        ty: ColumnType,
        _first_entry: EntryIndex,
    ) -> Result<ColumnHandle> {
        let desc = self
            .descriptor
            .field(field)
            .ok_or_else(|| field_err!(InvalidArgument, "column for unregistered field {field}"))?;
        let index = desc.columns.len() as u32;
        let handle = self.columns.len() as ColumnHandle;
        self.columns.push(ColumnState {
            ty,
            staged: Vec::new(),
            staged_elements: 0,
            pages: Vec::new(),
            n_committed: 0,
        });
        self.descriptor
            .add_column(field, ColumnDescriptor { ty, handle, index });
        Ok(handle)
    }

    fn append(&mut self, column: ColumnHandle, packed: &[u8]) -> Result<()> {
        let col = self.column_mut(column)?;
        if packed.len() != col.elem_size() {
            field_bail!(
                InvalidArgument,
                "packed element is {} bytes, column {} expects {}",
                packed.len(),
                col.ty,
                col.elem_size()
            );
        }
        col.staged.extend_from_slice(packed);
        col.staged_elements += 1;
        Ok(())
    }

    fn commit_cluster(&mut self, column: ColumnHandle) -> Result<()> {
        let col = self.column_mut(column)?;
        let n = col.staged_elements;
        let payload = split::encode_page(col.ty, &col.staged, n as usize);
        let header = PageHeader {
            n_elements: U64::new(n),
            payload_len: U32::new(payload.len() as u32),
            reserved: U32::new(0),
        };
        let mut blob = Vec::with_capacity(PAGE_HEADER_SIZE + payload.len());
        blob.extend_from_slice(header.as_bytes());
        blob.extend_from_slice(&payload);
        col.pages.push(Page {
            first_element: col.n_committed,
            n_elements: n,
            blob,
            decoded: None,
        });
        col.n_committed += n;
        col.staged.clear();
        col.staged_elements = 0;
        Ok(())
    }
}

impl PageSource for MemoryPageStore {
    fn descriptor(&self) -> Descriptor {
        self.descriptor.clone()
    }

    fn lookup_columns(&self, field: FieldId) -> Result<Vec<(ColumnType, ColumnHandle)>> {
        let desc = self
            .descriptor
            .field(field)
            .ok_or_else(|| field_err!(Io, "field {field} not in descriptor"))?;
        Ok(desc.columns.iter().map(|c| (c.ty, c.handle)).collect())
    }

    fn lookup_type_version(&self, field: FieldId) -> Result<u32> {
        self.descriptor
            .field(field)
            .map(|f| f.type_version)
            .ok_or_else(|| field_err!(Io, "field {field} not in descriptor"))
    }

    fn n_elements(&self, column: ColumnHandle) -> Result<u64> {
        Ok(self.column(column)?.n_committed)
    }

    fn read(&mut self, column: ColumnHandle, global: EntryIndex, out: &mut [u8]) -> Result<()> {
        let col = self.column(column)?;
        let elem_size = col.elem_size();
        let page = col.page_of(global)?;
        let first = col.pages[page].first_element;
        let decoded = self.decoded_page(column, page)?;
        let at = (global - first) as usize * elem_size;
        out[..elem_size].copy_from_slice(&decoded[at..at + elem_size]);
        Ok(())
    }

    fn read_v(
        &mut self,
        column: ColumnHandle,
        global: EntryIndex,
        count: usize,
        out: &mut [u8],
    ) -> Result<()> {
        let elem_size = self.column(column)?.elem_size();
        let mut cursor = global;
        let mut written = 0usize;
        let mut remaining = count;
        while remaining > 0 {
            let slice = self.map_v(column, cursor)?;
            let n = (slice.n_items as usize).min(remaining);
            let bytes = &slice.bytes()[..n * elem_size];
            out[written..written + bytes.len()].copy_from_slice(bytes);
            written += bytes.len();
            cursor += n as u64;
            remaining -= n;
        }
        Ok(())
    }

    fn collection_info(
        &mut self,
        column: ColumnHandle,
        global: EntryIndex,
    ) -> Result<(ClusterIndex, u64)> {
        let col = self.column(column)?;
        if !col.ty.is_index() {
            field_bail!(
                InvalidArgument,
                "collection info on non-offset column ({})",
                col.ty
            );
        }
        let page = col.page_of(global)?;
        let cluster_start = col.pages[page].first_element;
        let end = self.read_offset_element(column, global)?;
        let begin = if global == cluster_start {
            0
        } else {
            self.read_offset_element(column, global - 1)?
        };
        Ok((ClusterIndex::new(page as u64, begin), end - begin))
    }

    fn map_v(&mut self, column: ColumnHandle, global: EntryIndex) -> Result<PageSlice> {
        let col = self.column(column)?;
        let elem_size = col.elem_size();
        let page = col.page_of(global)?;
        let first = col.pages[page].first_element;
        let n = col.pages[page].n_elements;
        let decoded = self.decoded_page(column, page)?;
        Ok(PageSlice {
            page: decoded,
            elem_offset: (global - first) as usize,
            elem_size,
            n_items: n - (global - first),
        })
    }

    fn to_cluster(&self, column: ColumnHandle, global: EntryIndex) -> Result<ClusterIndex> {
        let col = self.column(column)?;
        let page = col.page_of(global)?;
        Ok(ClusterIndex::new(
            page as u64,
            global - col.pages[page].first_element,
        ))
    }

    fn to_global(&self, column: ColumnHandle, index: ClusterIndex) -> Result<EntryIndex> {
        let col = self.column(column)?;
        let page = col
            .pages
            .get(index.cluster_id as usize)
            .ok_or_else(|| field_err!(Io, "cluster {} does not exist", index.cluster_id))?;
        if index.index >= page.n_elements {
            field_bail!(
                Io,
                "index {} outside cluster {} ({} elements)",
                index.index,
                index.cluster_id,
                page.n_elements
            );
        }
        Ok(page.first_element + index.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_column(ty: ColumnType) -> (MemoryPageStore, ColumnHandle) {
        let mut store = MemoryPageStore::new(WriteOptions::default());
        let field = store.register_field(None, "f", "i32", 0);
        let col = store.create_column(field, ty, 0).unwrap();
        (store, col)
    }

    #[test]
    fn append_commit_read_round_trip() {
        let (mut store, col) = store_with_column(ColumnType::Int32);
        for v in [1i32, -1, i32::MAX] {
            store.append(col, &v.to_le_bytes()).unwrap();
        }
        store.commit_cluster(col).unwrap();

        let mut buf = [0u8; 4];
        store.read(col, 2, &mut buf).unwrap();
        assert_eq!(i32::from_le_bytes(buf), i32::MAX);

        let mut all = [0u8; 12];
        store.read_v(col, 0, 3, &mut all).unwrap();
        assert_eq!(&all[..4], &1i32.to_le_bytes());
    }

    #[test]
    fn uncommitted_elements_are_unreadable() {
        let (mut store, col) = store_with_column(ColumnType::Int32);
        store.append(col, &7i32.to_le_bytes()).unwrap();
        let mut buf = [0u8; 4];
        let err = store.read(col, 0, &mut buf).unwrap_err();
        assert_eq!(
            crate::error::kind_of(&err),
            Some(crate::error::ErrorKind::Io)
        );
    }

    #[test]
    fn split_encoding_lands_in_the_page_blob() {
        let (mut store, col) = store_with_column(ColumnType::SplitReal32);
        store.append(col, &1.5f32.to_le_bytes()).unwrap();
        store.append(col, &(-2.0f32).to_le_bytes()).unwrap();
        store.commit_cluster(col).unwrap();

        let blob = &store.columns[col as usize].pages[0].blob;
        let a = 1.5f32.to_le_bytes();
        let b = (-2.0f32).to_le_bytes();
        assert_eq!(
            &blob[PAGE_HEADER_SIZE..],
            &[a[0], b[0], a[1], b[1], a[2], b[2], a[3], b[3]]
        );

        // decoded reads still see canonical bytes
        let mut buf = [0u8; 4];
        store.read(col, 1, &mut buf).unwrap();
        assert_eq!(f32::from_le_bytes(buf), -2.0);
    }

    #[test]
    fn collection_info_is_cluster_local() {
        let (mut store, col) = store_with_column(ColumnType::Index64);
        // cluster 0: sizes 3, 0, 1 -> offsets 3, 3, 4
        for offset in [3u64, 3, 4] {
            store.append(col, &offset.to_le_bytes()).unwrap();
        }
        store.commit_cluster(col).unwrap();
        // cluster 1: sizes 2 -> offsets 2
        store.append(col, &2u64.to_le_bytes()).unwrap();
        store.commit_cluster(col).unwrap();

        let (start, size) = store.collection_info(col, 0).unwrap();
        assert_eq!((start, size), (ClusterIndex::new(0, 0), 3));
        let (start, size) = store.collection_info(col, 1).unwrap();
        assert_eq!((start, size), (ClusterIndex::new(0, 3), 0));
        let (start, size) = store.collection_info(col, 2).unwrap();
        assert_eq!((start, size), (ClusterIndex::new(0, 3), 1));
        // first entry of the second cluster starts over at item 0
        let (start, size) = store.collection_info(col, 3).unwrap();
        assert_eq!((start, size), (ClusterIndex::new(1, 0), 2));
    }

    #[test]
    fn map_v_clamps_at_page_end() {
        let (mut store, col) = store_with_column(ColumnType::UInt8);
        for v in 0u8..4 {
            store.append(col, &[v]).unwrap();
        }
        store.commit_cluster(col).unwrap();
        for v in 4u8..6 {
            store.append(col, &[v]).unwrap();
        }
        store.commit_cluster(col).unwrap();

        let slice = store.map_v(col, 2).unwrap();
        assert_eq!(slice.n_items, 2);
        assert_eq!(slice.bytes(), &[2, 3]);

        let slice = store.map_v(col, 4).unwrap();
        assert_eq!(slice.n_items, 2);
        assert_eq!(slice.bytes(), &[4, 5]);
    }

    #[test]
    fn index_translation_round_trips() {
        let (mut store, col) = store_with_column(ColumnType::Int32);
        for v in 0..5i32 {
            store.append(col, &v.to_le_bytes()).unwrap();
        }
        store.commit_cluster(col).unwrap();
        for v in 5..8i32 {
            store.append(col, &v.to_le_bytes()).unwrap();
        }
        store.commit_cluster(col).unwrap();

        let ci = store.to_cluster(col, 6).unwrap();
        assert_eq!(ci, ClusterIndex::new(1, 1));
        assert_eq!(store.to_global(col, ci).unwrap(), 6);
    }
}
