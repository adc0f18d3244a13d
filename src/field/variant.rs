//! # Variant Fields
//!
//! A variant over k alternatives writes one switch column plus the columns
//! of whichever alternative is active per entry. The switch element pairs
//! the 1-based alternative tag (0 marks a valueless entry) with the
//! cluster-local element index inside that alternative's streams; each
//! alternative keeps its own per-cluster append counter, reset at cluster
//! boundaries.

use eyre::Result;

use super::{Field, FieldKind};
use crate::types::{ClusterIndex, SwitchValue};
use crate::value::Value;
use crate::{field_bail, field_ensure};

impl Field {
    pub(crate) fn variant_append(&mut self, from: &Value) -> Result<usize> {
        let Value::Variant(active) = from else {
            field_bail!(
                InvalidArgument,
                "field '{}' expects a variant value, got {}",
                self.name(),
                from.kind_name()
            );
        };
        match active {
            None => {
                // valueless: tag 0, no alternative data
                self.columns[0].append_switch(SwitchValue::new(0, 0))
            }
            Some((alt, value)) => {
                let alt = *alt as usize;
                field_ensure!(
                    alt < self.children.len(),
                    InvalidArgument,
                    "variant value selects alternative {alt}, field '{}' has {}",
                    self.name(),
                    self.children.len()
                );
                let mut written = self.children[alt].append(value)?;
                let FieldKind::Variant { n_written } = &mut self.kind else {
                    unreachable!("variant_append on a non-variant field");
                };
                let index = n_written[alt];
                n_written[alt] += 1;
                written += self.columns[0].append_switch(SwitchValue::new(
                    index,
                    alt as u32 + 1,
                ))?;
                Ok(written)
            }
        }
    }

    pub(crate) fn variant_read(&self, global: u64, to: &mut Value) -> Result<()> {
        let switch = self.principal()?.read_switch(global)?;
        if switch.is_valueless() {
            *to = Value::Variant(None);
            return Ok(());
        }
        let alt = (switch.tag - 1) as usize;
        field_ensure!(
            alt < self.children.len(),
            Io,
            "switch tag {} exceeds the {} alternatives of '{}'",
            switch.tag,
            self.children.len(),
            self.name()
        );
        let cluster_id = self.principal()?.to_cluster(global)?.cluster_id;
        let mut item = self.children[alt].generate_value();
        self.children[alt].read_cluster(ClusterIndex::new(cluster_id, switch.index), &mut item)?;
        *to = Value::Variant(Some((alt as u32, Box::new(item))));
        Ok(())
    }
}
