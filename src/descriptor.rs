//! # Persisted Schema Metadata
//!
//! The descriptor records, per on-disk field: identity, parentage, declared
//! type name, type version, and the ordered column streams the field was
//! serialized to. The page sink builds it as fields register during
//! connect-to-sink; the page source hands it back so a reader can bind its
//! in-memory field tree to on-disk ids before connecting.
//!
//! Qualified paths join child names with `.`; base-class subfields keep
//! their reserved leading `:`, so a path crossing a base-class boundary
//! reads `event.:particle.pt`.

use hashbrown::HashMap;

use crate::types::{ColumnHandle, ColumnType, FieldId};

/// One column stream of a field, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub ty: ColumnType,
    pub handle: ColumnHandle,
    pub index: u32,
}

/// Schema metadata of one on-disk field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub id: FieldId,
    pub parent: Option<FieldId>,
    pub name: String,
    pub type_name: String,
    pub type_version: u32,
    pub columns: Vec<ColumnDescriptor>,
}

/// The full persisted schema of one stream.
#[derive(Debug, Clone, Default)]
pub struct Descriptor {
    fields: Vec<FieldDescriptor>,
    by_id: HashMap<FieldId, usize>,
}

impl Descriptor {
    pub fn add_field(&mut self, field: FieldDescriptor) {
        self.by_id.insert(field.id, self.fields.len());
        self.fields.push(field);
    }

    pub fn add_column(&mut self, field: FieldId, column: ColumnDescriptor) {
        if let Some(&slot) = self.by_id.get(&field) {
            self.fields[slot].columns.push(column);
        }
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldDescriptor> {
        self.by_id.get(&id).map(|&slot| &self.fields[slot])
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    /// Column element types of a field, in column order.
    pub fn column_types(&self, id: FieldId) -> Option<Vec<ColumnType>> {
        self.field(id)
            .map(|f| f.columns.iter().map(|c| c.ty).collect())
    }

    /// Resolves a qualified path (`a.b`, `event.:base.x`) to a field id.
    pub fn field_id_for_path(&self, path: &str) -> Option<FieldId> {
        let mut parent: Option<FieldId> = None;
        for segment in path.split('.') {
            let next = self.fields.iter().find(|f| {
                f.parent == parent && f.name == segment
            })?;
            parent = Some(next.id);
        }
        parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(id: FieldId, parent: Option<FieldId>, name: &str) -> FieldDescriptor {
        FieldDescriptor {
            id,
            parent,
            name: name.to_owned(),
            type_name: "i32".to_owned(),
            type_version: 0,
            columns: Vec::new(),
        }
    }

    #[test]
    fn path_lookup_walks_parentage() {
        let mut desc = Descriptor::default();
        desc.add_field(field(1, None, "event"));
        desc.add_field(field(2, Some(1), "jets"));
        desc.add_field(field(3, Some(2), "_0"));
        desc.add_field(field(4, None, "jets"));

        assert_eq!(desc.field_id_for_path("event"), Some(1));
        assert_eq!(desc.field_id_for_path("event.jets"), Some(2));
        assert_eq!(desc.field_id_for_path("event.jets._0"), Some(3));
        assert_eq!(desc.field_id_for_path("jets"), Some(4));
        assert_eq!(desc.field_id_for_path("event.mu"), None);
    }

    #[test]
    fn base_class_segments_keep_their_colon() {
        let mut desc = Descriptor::default();
        desc.add_field(field(1, None, "track"));
        desc.add_field(field(2, Some(1), ":base"));
        desc.add_field(field(3, Some(2), "x"));

        assert_eq!(desc.field_id_for_path("track.:base.x"), Some(3));
    }

    #[test]
    fn column_types_follow_declaration_order() {
        let mut desc = Descriptor::default();
        desc.add_field(field(1, None, "s"));
        desc.add_column(
            1,
            ColumnDescriptor {
                ty: ColumnType::SplitIndex64,
                handle: 0,
                index: 0,
            },
        );
        desc.add_column(
            1,
            ColumnDescriptor {
                ty: ColumnType::UInt8,
                handle: 1,
                index: 1,
            },
        );
        assert_eq!(
            desc.column_types(1),
            Some(vec![ColumnType::SplitIndex64, ColumnType::UInt8])
        );
    }
}
