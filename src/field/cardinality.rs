//! # Cardinality Fields
//!
//! A read-only projection that exposes a collection's size as one scalar
//! per entry, in 32- or 64-bit width. The field binds to the collection's
//! offset column (via the collection's on-disk id) and never writes. The
//! bulk path walks the offset column page by page and differences
//! consecutive offsets; pages stop at cluster boundaries, so a bulk call
//! never crosses one.

use eyre::Result;

use super::{BulkSpec, Field, FieldKind, ALL_SET};
use crate::encoding::element;
use crate::types::ClusterIndex;
use crate::value::Value;
use crate::field_bail;

impl Field {
    fn store_cardinality(&self, size: u64, to: &mut Value) -> Result<()> {
        match (&self.kind, to) {
            (FieldKind::Cardinality { bits: 32 }, Value::U32(v)) => {
                *v = u32::try_from(size)
                    .map_err(|_| crate::field_err!(Io, "collection size {size} exceeds u32"))?;
            }
            (FieldKind::Cardinality { .. }, Value::U64(v)) => *v = size,
            (_, to) => field_bail!(
                InvalidArgument,
                "field '{}' cannot store a cardinality into {}",
                self.name(),
                to.kind_name()
            ),
        }
        Ok(())
    }

    pub(crate) fn cardinality_read(&self, global: u64, to: &mut Value) -> Result<()> {
        let (_, size) = self.principal()?.collection_info(global)?;
        self.store_cardinality(size, to)
    }

    pub(crate) fn cardinality_read_cluster(
        &self,
        index: ClusterIndex,
        to: &mut Value,
    ) -> Result<()> {
        let (_, size) = self.principal()?.collection_info_cluster(index)?;
        self.store_cardinality(size, to)
    }

    /// Fills the whole range in page-sized batches of offset differences.
    pub(crate) fn cardinality_read_bulk(&self, mut spec: BulkSpec<'_>) -> Result<usize> {
        let column = self.principal()?;
        let (start, size) = column.collection_info_cluster(spec.first)?;
        self.store_cardinality(size, &mut spec.values[0])?;

        let mut last_offset = start.index + size;
        let mut n_entries = 1usize;
        while n_entries < spec.count {
            let slice = column.map_v_cluster(spec.first.offset_by(n_entries as u64))?;
            let n_batch = (spec.count - n_entries).min(slice.n_items as usize);
            let bytes = slice.bytes();
            for i in 0..n_batch {
                let offset = element::unpack_index(
                    column.column_type(),
                    &bytes[i * slice.elem_size..(i + 1) * slice.elem_size],
                )?;
                self.store_cardinality(offset - last_offset, &mut spec.values[n_entries + i])?;
                last_offset = offset;
            }
            n_entries += n_batch;
        }
        spec.mask_avail.fill(true);
        Ok(ALL_SET)
    }
}
