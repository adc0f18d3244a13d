//! # Fixed Arrays and Bitsets
//!
//! Neither needs an offset column: the element count is part of the type.
//! A fixed array of length N appends and reads its item subfield N times,
//! advancing the element index by one per slot, so a leaf nested under
//! arrays sees its entry index multiplied by every repetition level above
//! it. A bitset of width N stores N single-bit elements per entry and is
//! reconstructed bit by bit into the word-backed value.

use eyre::Result;

use super::{Field, FieldKind};
use crate::types::ClusterIndex;
use crate::value::{Bitset, Value};
use crate::{field_bail, field_ensure};

impl Field {
    fn array_items<'a>(&self, value: &'a Value) -> Result<&'a [Value]> {
        let Value::Array(items) = value else {
            field_bail!(
                InvalidArgument,
                "field '{}' expects an array value, got {}",
                self.name(),
                value.kind_name()
            );
        };
        field_ensure!(
            items.len() == self.n_repetitions(),
            InvalidArgument,
            "array value has {} elements, field '{}' is fixed at {}",
            items.len(),
            self.name(),
            self.n_repetitions()
        );
        Ok(items)
    }

    pub(crate) fn array_append(&mut self, from: &Value) -> Result<usize> {
        let items = self.array_items(from)?;
        let mut written = 0;
        for item in items {
            written += self.children[0].append(item)?;
        }
        Ok(written)
    }

    pub(crate) fn array_read(&self, global: u64, to: &mut Value) -> Result<()> {
        let len = self.n_repetitions() as u64;
        let mut items = Vec::with_capacity(len as usize);
        for i in 0..len {
            let mut item = self.children[0].generate_value();
            self.children[0].read(global * len + i, &mut item)?;
            items.push(item);
        }
        *to = Value::Array(items);
        Ok(())
    }

    pub(crate) fn array_read_cluster(&self, index: ClusterIndex, to: &mut Value) -> Result<()> {
        let len = self.n_repetitions() as u64;
        let mut items = Vec::with_capacity(len as usize);
        for i in 0..len {
            let mut item = self.children[0].generate_value();
            self.children[0].read_cluster(
                ClusterIndex::new(index.cluster_id, index.index * len + i),
                &mut item,
            )?;
            items.push(item);
        }
        *to = Value::Array(items);
        Ok(())
    }

    fn bitset_width(&self) -> usize {
        match &self.kind {
            FieldKind::Bitset { n_bits } => *n_bits,
            _ => unreachable!("bitset width on a non-bitset field"),
        }
    }

    pub(crate) fn bitset_append(&mut self, from: &Value) -> Result<usize> {
        let n_bits = self.bitset_width();
        let Value::Bitset(bits) = from else {
            field_bail!(
                InvalidArgument,
                "field '{}' expects a bitset value, got {}",
                self.name(),
                from.kind_name()
            );
        };
        field_ensure!(
            bits.len() == n_bits,
            InvalidArgument,
            "bitset value has {} bits, field '{}' is fixed at {n_bits}",
            bits.len(),
            self.name()
        );
        let mut written = 0;
        for i in 0..n_bits {
            written += self.columns[0].append_scalar(&Value::Bool(bits.get(i)))?;
        }
        Ok(written)
    }

    pub(crate) fn bitset_read(&self, global: u64, to: &mut Value) -> Result<()> {
        let n_bits = self.bitset_width();
        let mut bits = Bitset::new(n_bits);
        let mut bit = Value::Bool(false);
        for i in 0..n_bits {
            self.principal()?
                .read_scalar(global * n_bits as u64 + i as u64, &mut bit)?;
            if bit == Value::Bool(true) {
                bits.set(i, true);
            }
        }
        *to = Value::Bitset(bits);
        Ok(())
    }

    pub(crate) fn bitset_read_cluster(&self, index: ClusterIndex, to: &mut Value) -> Result<()> {
        let n_bits = self.bitset_width();
        let mut bits = Bitset::new(n_bits);
        let mut bit = Value::Bool(false);
        for i in 0..n_bits {
            self.principal()?.read_scalar_cluster(
                ClusterIndex::new(index.cluster_id, index.index * n_bits as u64 + i as u64),
                &mut bit,
            )?;
            if bit == Value::Bool(true) {
                bits.set(i, true);
            }
        }
        *to = Value::Bitset(bits);
        Ok(())
    }
}
