//! # Bulk Reads
//!
//! A [`Bulk`] handle serves repeated masked reads over one cluster-local
//! range. It owns the value array and an availability mask; a single bulk
//! may serve multiple read operations on the same range where each
//! operation requires a different subset of slots. Values already marked
//! available are never re-read until the range changes.
//!
//! Field implementations see the request as a [`BulkSpec`]: the required
//! mask, the availability mask to update, the destination slots, and an
//! auxiliary scratch buffer that stays untouched between calls (used by
//! collection fields to stage packed item bytes).

use eyre::Result;

use super::Field;
use crate::types::ClusterIndex;
use crate::value::Value;
use crate::{field_bail, field_ensure};

/// Returned by a bulk implementation that filled every slot of the range
/// regardless of the required mask.
pub const ALL_SET: usize = usize::MAX;

/// One bulk request as seen by a field's bulk implementation.
pub struct BulkSpec<'a> {
    /// Start of the bulk range.
    pub first: ClusterIndex,
    /// Size of the bulk range.
    pub count: usize,
    /// Slots the caller needs; length is at least `count`.
    pub mask_req: &'a [bool],
    /// Slots holding valid values; set for every slot actually populated.
    pub mask_avail: &'a mut [bool],
    /// Destination slots, all constructed values of the field's shape.
    pub values: &'a mut [Value],
    /// Field-owned scratch memory, persistent between calls on one handle.
    pub aux: &'a mut Vec<u8>,
}

/// Reusable value array + availability mask over a cluster-local range.
pub struct Bulk<'f> {
    field: &'f Field,
    values: Vec<Value>,
    mask_avail: Vec<bool>,
    n_valid: usize,
    first: ClusterIndex,
    size: usize,
    aux: Vec<u8>,
}

impl<'f> Bulk<'f> {
    pub(crate) fn new(field: &'f Field) -> Self {
        Self {
            field,
            values: Vec::new(),
            mask_avail: Vec::new(),
            n_valid: 0,
            first: ClusterIndex::default(),
            size: 0,
            aux: Vec::new(),
        }
    }

    fn contains_range(&self, first: ClusterIndex, count: usize) -> bool {
        first.cluster_id == self.first.cluster_id
            && first.index >= self.first.index
            && first.index + count as u64 <= self.first.index + self.size as u64
    }

    /// Adopts a new range: the value array is rebuilt with freshly
    /// constructed values and the availability mask is cleared.
    fn reset(&mut self, first: ClusterIndex, count: usize) {
        let field = self.field;
        self.values.clear();
        self.values
            .extend(std::iter::repeat_with(|| field.generate_value()).take(count));
        self.mask_avail.clear();
        self.mask_avail.resize(count, false);
        self.n_valid = 0;
        self.first = first;
        self.size = count;
    }

    fn count_valid(&mut self) {
        self.n_valid = self.mask_avail.iter().filter(|&&m| m).count();
    }

    /// Number of slots currently holding valid values; non-decreasing
    /// until the range changes.
    pub fn valid_count(&self) -> usize {
        self.n_valid
    }

    /// Reads `count` values starting at the cluster-local `first`. Only
    /// slots with a set `mask_req` bit are guaranteed to be populated in
    /// the returned slice; previously populated slots are reused.
    pub fn read_bulk(
        &mut self,
        first: ClusterIndex,
        mask_req: &[bool],
        count: usize,
    ) -> Result<&[Value]> {
        field_ensure!(count > 0, InvalidArgument, "bulk read of zero values");
        if mask_req.len() < count {
            field_bail!(
                InvalidArgument,
                "required mask has {} slots, bulk range has {count}",
                mask_req.len()
            );
        }
        if !self.contains_range(first, count) {
            self.reset(first, count);
        }

        // we may serve a sub range of the currently adopted range
        let offset = (first.index - self.first.index) as usize;

        if self.n_valid == self.size {
            return Ok(&self.values[offset..offset + count]);
        }

        let spec = BulkSpec {
            first,
            count,
            mask_req,
            mask_avail: &mut self.mask_avail[offset..offset + count],
            values: &mut self.values[offset..offset + count],
            aux: &mut self.aux,
        };
        let n_read = self.field.read_bulk(spec)?;
        if n_read == ALL_SET {
            if offset == 0 && count == self.size {
                self.n_valid = self.size;
            } else {
                self.count_valid();
            }
        } else {
            self.n_valid += n_read;
        }
        Ok(&self.values[offset..offset + count])
    }
}
