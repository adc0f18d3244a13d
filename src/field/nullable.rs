//! # Nullable Fields
//!
//! Values that may be missing per entry: optionals and unique-owning
//! references. The on-disk representation is dense or sparse:
//!
//! - **Dense**: a bit column (1 = present). A default-constructed item is
//!   written for every missing slot so the item columns stay aligned
//!   1-to-1 with the bit column.
//! - **Sparse**: an index column counting the items written so far, i.e. a
//!   collection offset of size 0 or 1 per entry; missing slots contribute
//!   nothing to the item columns.
//!
//! Dense is the automatic choice when the item's on-disk element size does
//! not exceed the four bytes a sparse index entry costs; either encoding
//! can be forced before connecting.

use eyre::Result;

use super::{Field, FieldKind, KindTag};
use crate::types::ColumnType;
use crate::value::Value;
use crate::{field_bail, field_ensure};

impl Field {
    /// Whether the present/missing information is encoded as a bit column.
    pub fn is_dense(&self) -> bool {
        self.representative().first() == Some(&ColumnType::Bit)
    }

    pub fn is_sparse(&self) -> bool {
        !self.is_dense()
    }

    /// Forces the dense (bit column) encoding. Only before connecting.
    pub fn set_dense(&mut self) -> Result<()> {
        field_ensure!(
            self.kind.tag() == KindTag::Nullable,
            InvalidArgument,
            "'{}' is not a nullable field",
            self.name()
        );
        self.set_representative(&[ColumnType::Bit])
    }

    /// Forces the sparse (index column) encoding. Only before connecting.
    pub fn set_sparse(&mut self) -> Result<()> {
        field_ensure!(
            self.kind.tag() == KindTag::Nullable,
            InvalidArgument,
            "'{}' is not a nullable field",
            self.name()
        );
        self.set_representative(&[ColumnType::SplitIndex32])
    }

    pub(crate) fn nullable_append(&mut self, from: &Value) -> Result<usize> {
        let Value::Nullable(item) = from else {
            field_bail!(
                InvalidArgument,
                "field '{}' expects a nullable value, got {}",
                self.name(),
                from.kind_name()
            );
        };
        if self.is_dense() {
            match item {
                Some(value) => {
                    let written = self.children[0].append(value)?;
                    Ok(written + self.columns[0].append_scalar(&Value::Bool(true))?)
                }
                None => {
                    let FieldKind::Nullable { default_item, .. } = &self.kind else {
                        unreachable!("nullable_append on a non-nullable field");
                    };
                    let written = self.children[0].append(default_item)?;
                    Ok(written + self.columns[0].append_scalar(&Value::Bool(false))?)
                }
            }
        } else {
            let mut written = 0;
            if let Some(value) = item {
                written += self.children[0].append(value)?;
                let FieldKind::Nullable { n_written, .. } = &mut self.kind else {
                    unreachable!("nullable_append on a non-nullable field");
                };
                *n_written += 1;
            }
            let FieldKind::Nullable { n_written, .. } = &self.kind else {
                unreachable!("nullable_append on a non-nullable field");
            };
            written += self.columns[0].append_index(*n_written)?;
            Ok(written)
        }
    }

    pub(crate) fn nullable_read(&self, global: u64, to: &mut Value) -> Result<()> {
        let item_index = if self.is_dense() {
            let mut present = Value::Bool(false);
            self.principal()?.read_scalar(global, &mut present)?;
            if present == Value::Bool(true) {
                // dense items are 1:1 with the outer entries
                Some(self.principal()?.to_cluster(global)?)
            } else {
                None
            }
        } else {
            let (start, size) = self.principal()?.collection_info(global)?;
            (size > 0).then_some(start)
        };
        match item_index {
            Some(index) => {
                let mut item = self.children[0].generate_value();
                self.children[0].read_cluster(index, &mut item)?;
                *to = Value::Nullable(Some(Box::new(item)));
            }
            None => *to = Value::Nullable(None),
        }
        Ok(())
    }
}
