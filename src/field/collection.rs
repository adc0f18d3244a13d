//! # Variable-Length Collections
//!
//! One offset column on the collection field, one item subfield. Appending
//! writes the items, then pushes the cumulative item count; offsets are
//! cluster-local, monotonically non-decreasing within a cluster and reset
//! to zero at each cluster boundary. Reading derives `[begin, end)` from
//! two consecutive offsets (zero at cluster start) and re-reads the items
//! in cluster-local coordinates, which is why item subfields start their
//! principal index at zero.
//!
//! Sets share the on-disk format and materialize as an ordered set would:
//! sorted, with duplicates collapsed. Proxied collections iterate through
//! the registry-supplied proxy; the untyped collection field is the
//! write-only bridge for a secondary writer.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};

use eyre::Result;

use super::{BulkSpec, Field, FieldKind};
use crate::encoding::element;
use crate::field_bail;
use crate::types::ClusterIndex;
use crate::value::Value;

/// Offset counter of an untyped collection: the secondary writer advances
/// it per sub-entry, the owning field appends its running total per entry
/// and resets it at cluster boundaries.
#[derive(Debug, Default)]
pub struct CollectionWriter {
    n_written: AtomicU64,
}

impl CollectionWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `n` sub-entries written since the last top-level entry.
    pub fn advance(&self, n: u64) {
        self.n_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.n_written.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.n_written.store(0, Ordering::Relaxed);
    }
}

impl Field {
    fn bump_collection_offset(&mut self, n_items: u64) -> u64 {
        match &mut self.kind {
            FieldKind::Vector { n_written }
            | FieldKind::Set { n_written }
            | FieldKind::Proxied { n_written, .. } => {
                *n_written += n_items;
                *n_written
            }
            _ => unreachable!("collection offset on a non-collection field"),
        }
    }

    pub(crate) fn vector_append(&mut self, from: &Value) -> Result<usize> {
        let Value::Vector(items) = from else {
            field_bail!(
                InvalidArgument,
                "field '{}' expects a vector value, got {}",
                self.name(),
                from.kind_name()
            );
        };
        self.collection_append_items(items)
    }

    pub(crate) fn set_append(&mut self, from: &Value) -> Result<usize> {
        let Value::Set(items) = from else {
            field_bail!(
                InvalidArgument,
                "field '{}' expects a set value, got {}",
                self.name(),
                from.kind_name()
            );
        };
        self.collection_append_items(items)
    }

    fn collection_append_items(&mut self, items: &[Value]) -> Result<usize> {
        let mut written = 0;
        for item in items {
            written += self.children[0].append(item)?;
        }
        let offset = self.bump_collection_offset(items.len() as u64);
        written += self.columns[0].append_index(offset)?;
        Ok(written)
    }

    pub(crate) fn proxied_append(&mut self, from: &Value) -> Result<usize> {
        let FieldKind::Proxied { proxy, .. } = &self.kind else {
            unreachable!("proxied_append on a non-proxied field");
        };
        let proxy = proxy.clone();
        let mut written = 0;
        let mut n_items = 0u64;
        for item in proxy.items(from)? {
            written += self.children[0].append(item)?;
            n_items += 1;
        }
        let offset = self.bump_collection_offset(n_items);
        written += self.columns[0].append_index(offset)?;
        Ok(written)
    }

    /// Reads the items of one collection, given the cluster-local start and
    /// size from the offset column.
    pub(crate) fn collection_read(
        &self,
        start: ClusterIndex,
        size: u64,
        to: &mut Value,
    ) -> Result<()> {
        match &self.kind {
            FieldKind::Vector { .. } => {
                let mut items = Vec::with_capacity(size as usize);
                for k in 0..size {
                    let mut item = self.children[0].generate_value();
                    self.children[0].read_cluster(start.offset_by(k), &mut item)?;
                    items.push(item);
                }
                *to = Value::Vector(items);
            }
            FieldKind::Set { .. } => {
                let mut items = Vec::with_capacity(size as usize);
                for k in 0..size {
                    let mut item = self.children[0].generate_value();
                    self.children[0].read_cluster(start.offset_by(k), &mut item)?;
                    items.push(item);
                }
                sort_set_items(&mut items);
                *to = Value::Set(items);
            }
            FieldKind::Proxied { proxy, .. } => {
                proxy.clear(to)?;
                for k in 0..size {
                    let mut item = self.children[0].generate_value();
                    self.children[0].read_cluster(start.offset_by(k), &mut item)?;
                    proxy.push(to, item)?;
                }
            }
            _ => unreachable!("collection_read on a non-collection field"),
        }
        Ok(())
    }

    /// The untyped collection field writes the secondary writer's running
    /// offset; the bound value only fixes the shape. Reading projects such
    /// streams through an ordinary collection field instead.
    pub(crate) fn untyped_collection_append(&mut self, from: &Value) -> Result<usize> {
        let Value::Index(_) = from else {
            field_bail!(
                InvalidArgument,
                "field '{}' expects an index value, got {}",
                self.name(),
                from.kind_name()
            );
        };
        let FieldKind::UntypedCollection { writer } = &self.kind else {
            unreachable!("untyped_collection_append on wrong field kind");
        };
        let offset = writer.count();
        self.columns[0].append_index(offset)
    }

    /// Bulk path for collections of simple items: stage the packed items of
    /// the whole range in one contiguous column read, then slice them into
    /// the slots the mask requires. The staged bytes live in the bulk's aux
    /// buffer, whose layout stays valid between calls on the same handle.
    pub(crate) fn collection_read_bulk(&self, mut spec: BulkSpec<'_>) -> Result<usize> {
        let offsets = self.principal()?;
        let (first_start, first_size) = offsets.collection_info_cluster(spec.first)?;
        let (last_start, last_size) = if spec.count == 1 {
            (first_start, first_size)
        } else {
            offsets.collection_info_cluster(spec.first.offset_by(spec.count as u64 - 1))?
        };
        let item_begin = first_start.index;
        let item_end = last_start.index + last_size;
        let n_items = (item_end - item_begin) as usize;

        let item_column = self.children[0].principal()?;
        let elem_size = item_column.packed_size();
        let item_type = item_column.column_type();
        spec.aux.clear();
        spec.aux.resize(n_items * elem_size, 0);
        if n_items > 0 {
            item_column.read_v(
                ClusterIndex::new(first_start.cluster_id, item_begin),
                n_items,
                spec.aux,
            )?;
        }

        let mut n_new = 0;
        for k in 0..spec.count {
            if !spec.mask_req[k] || spec.mask_avail[k] {
                continue;
            }
            let (start, size) = offsets.collection_info_cluster(spec.first.offset_by(k as u64))?;
            let mut items = Vec::with_capacity(size as usize);
            for i in 0..size as usize {
                let at = ((start.index - item_begin) as usize + i) * elem_size;
                let mut item = self.children[0].generate_value();
                element::unpack_scalar(item_type, &spec.aux[at..at + elem_size], &mut item)?;
                items.push(item);
            }
            spec.values[k] = match self.kind {
                FieldKind::Set { .. } => {
                    sort_set_items(&mut items);
                    Value::Set(items)
                }
                _ => Value::Vector(items),
            };
            spec.mask_avail[k] = true;
            n_new += 1;
        }
        Ok(n_new)
    }
}

/// Ordered-set materialization: sorted, duplicates collapsed as an
/// ordered-set insert would collapse them.
fn sort_set_items(items: &mut Vec<Value>) {
    items.sort_by(|a, b| a.total_cmp(b));
    items.dedup_by(|a, b| a.total_cmp(b) == CmpOrdering::Equal);
}
