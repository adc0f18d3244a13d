//! # Record Fields
//!
//! A record stores its subfields consecutively, with the memory layout a C
//! struct would have: member offsets are padded to each member's alignment
//! and cached together with the total size and the strictest alignment.
//! Named record types from the registry additionally split their children
//! into base-type subfields (reserved `:` name prefix) and data members,
//! and may install schema-evolution read callbacks when connected to a
//! source whose on-disk type version differs.
//!
//! Pair and tuple fields are records with generated child names `_0`,
//! `_1`, ...; the enum and atomic wrappers delegate to their single child.

use eyre::Result;

use super::{align_up, Field, FieldKind, FieldState, RecordLayout, SubFieldRole};
use crate::types::ClusterIndex;
use crate::value::Value;
use crate::{field_bail, field_ensure};

/// Offsets, size and alignment of the equivalent C struct.
pub(crate) fn compute_record_layout(
    children: &[Field],
    roles: Vec<SubFieldRole>,
    version: u32,
    resolver: Option<crate::reflect::SharedResolver>,
) -> RecordLayout {
    let mut offsets = Vec::with_capacity(children.len());
    let mut size = 0usize;
    let mut max_align = 1usize;
    for child in children {
        let align = child.alignment();
        size = align_up(size, align);
        offsets.push(size);
        size += child.value_size();
        max_align = max_align.max(align);
    }
    size = align_up(size, max_align);
    RecordLayout {
        offsets,
        size,
        max_align,
        roles,
        version,
        resolver,
    }
}

impl Field {
    fn record_items<'a>(&self, value: &'a Value) -> Result<&'a [Value]> {
        let Value::Record(items) = value else {
            field_bail!(
                InvalidArgument,
                "field '{}' expects a record value, got {}",
                self.name(),
                value.kind_name()
            );
        };
        field_ensure!(
            items.len() == self.children.len(),
            InvalidArgument,
            "record value has {} members, field '{}' has {}",
            items.len(),
            self.name(),
            self.children.len()
        );
        Ok(items)
    }

    fn record_items_mut<'a>(&self, value: &'a mut Value) -> Result<&'a mut Vec<Value>> {
        let Value::Record(items) = value else {
            field_bail!(
                InvalidArgument,
                "field '{}' expects a record value, got {}",
                self.name(),
                value.kind_name()
            );
        };
        field_ensure!(
            items.len() == self.children.len(),
            InvalidArgument,
            "record value has {} members, field '{}' has {}",
            items.len(),
            self.name(),
            self.children.len()
        );
        Ok(items)
    }

    pub(crate) fn record_append(&mut self, from: &Value) -> Result<usize> {
        let items = self.record_items(from)?;
        let mut written = 0;
        for (child, item) in self.children.iter_mut().zip(items.iter()) {
            written += child.append(item)?;
        }
        Ok(written)
    }

    pub(crate) fn record_read(&self, global: u64, to: &mut Value) -> Result<()> {
        let items = self.record_items_mut(to)?;
        for (child, item) in self.children.iter().zip(items.iter_mut()) {
            // members without an on-disk counterpart stay at their default
            // and are filled by schema-evolution callbacks, if any
            if child.state() != FieldState::ConnectedToSource {
                continue;
            }
            child.read(global, item)?;
        }
        Ok(())
    }

    pub(crate) fn record_read_cluster(&self, index: ClusterIndex, to: &mut Value) -> Result<()> {
        let items = self.record_items_mut(to)?;
        for (child, item) in self.children.iter().zip(items.iter_mut()) {
            if child.state() != FieldState::ConnectedToSource {
                continue;
            }
            child.read_cluster(index, item)?;
        }
        Ok(())
    }

    /// Installs schema-evolution read callbacks when the on-disk type
    /// version of a registered record type differs from the in-memory one.
    /// A version difference with no registered rules refuses the stream.
    pub(crate) fn record_on_connect_source(&mut self) -> Result<()> {
        let FieldKind::Record(layout) = &self.kind else {
            return Ok(());
        };
        let Some(resolver) = layout.resolver.clone() else {
            return Ok(());
        };
        let version = layout.version;
        let Some(on_disk) = self.on_disk_type_version() else {
            return Ok(());
        };
        if on_disk == version {
            return Ok(());
        }
        let rules = resolver.evolution_rules(self.type_name(), on_disk);
        field_ensure!(
            !rules.is_empty(),
            SchemaMismatch,
            "on-disk version {on_disk} of type '{}' has no rule towards version {version}",
            self.type_name()
        );
        tracing::debug!(
            ty = %self.type_name(),
            from = on_disk,
            to = version,
            rules = rules.len(),
            "installing schema-evolution callbacks"
        );
        for rule in rules {
            self.add_read_callback(rule);
        }
        Ok(())
    }

    /// Byte offset of each record member in the equivalent C layout.
    pub fn member_offsets(&self) -> Option<&[usize]> {
        match &self.kind {
            FieldKind::Record(layout) => Some(&layout.offsets),
            _ => None,
        }
    }

    /// Whether the record subfield at `index` represents a base type
    /// rather than a data member.
    pub fn is_base_subfield(&self, index: usize) -> bool {
        match &self.kind {
            FieldKind::Record(layout) => {
                layout.roles.get(index) == Some(&SubFieldRole::BaseClass)
            }
            _ => false,
        }
    }
}
