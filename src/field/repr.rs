//! # Column Representation Sets
//!
//! A representation is one sequence of column element types realizing a
//! physical encoding for a field. Fields declare an ordered list of
//! serialization representations (first is the write default) and may add
//! deserialization-only extras, e.g. a 64-bit float field reading a stream
//! written at 32-bit precision. Everything writable must also be readable,
//! so the deserialization set is the union.

use crate::types::ColumnType;

use super::{Field, FieldKind};

#[derive(Debug, Clone, Default)]
pub struct ColumnRepresentations {
    serialization: Vec<Vec<ColumnType>>,
    deserialization: Vec<Vec<ColumnType>>,
}

impl ColumnRepresentations {
    pub(crate) fn new(
        serialization: Vec<Vec<ColumnType>>,
        deserialization_extra: Vec<Vec<ColumnType>>,
    ) -> Self {
        let mut deserialization = serialization.clone();
        deserialization.extend(deserialization_extra);
        Self {
            serialization,
            deserialization,
        }
    }

    pub(crate) fn empty() -> Self {
        Self::default()
    }

    /// The default representation for writing.
    pub fn serialization_default(&self) -> &[ColumnType] {
        &self.serialization[0]
    }

    pub fn serialization_types(&self) -> &[Vec<ColumnType>] {
        &self.serialization
    }

    /// Serialization types plus the read-only extras.
    pub fn deserialization_types(&self) -> &[Vec<ColumnType>] {
        &self.deserialization
    }
}

/// Offset-column representations shared by every collection-shaped field.
pub(crate) fn offset_representations() -> ColumnRepresentations {
    ColumnRepresentations::new(
        vec![
            vec![ColumnType::SplitIndex64],
            vec![ColumnType::Index64],
            vec![ColumnType::SplitIndex32],
            vec![ColumnType::Index32],
        ],
        vec![],
    )
}

pub(crate) fn representations_for(field: &Field) -> ColumnRepresentations {
    match &field.kind {
        FieldKind::Leaf(prim) => prim.representations(),
        FieldKind::String { .. } => ColumnRepresentations::new(
            vec![
                vec![ColumnType::SplitIndex64, ColumnType::UInt8],
                vec![ColumnType::Index64, ColumnType::UInt8],
                vec![ColumnType::SplitIndex32, ColumnType::UInt8],
                vec![ColumnType::Index32, ColumnType::UInt8],
            ],
            vec![],
        ),
        FieldKind::Vector { .. }
        | FieldKind::Set { .. }
        | FieldKind::Proxied { .. }
        | FieldKind::UntypedCollection { .. } => offset_representations(),
        FieldKind::Bitset { .. } => {
            ColumnRepresentations::new(vec![vec![ColumnType::Bit]], vec![])
        }
        FieldKind::Variant { .. } => {
            ColumnRepresentations::new(vec![vec![ColumnType::Switch]], vec![])
        }
        FieldKind::Nullable { .. } => ColumnRepresentations::new(
            vec![
                vec![ColumnType::Bit],
                vec![ColumnType::SplitIndex64],
                vec![ColumnType::SplitIndex32],
                vec![ColumnType::Index64],
                vec![ColumnType::Index32],
            ],
            vec![],
        ),
        // read-only: every offset representation is acceptable on disk
        FieldKind::Cardinality { .. } => ColumnRepresentations::new(
            vec![],
            vec![
                vec![ColumnType::SplitIndex64],
                vec![ColumnType::Index64],
                vec![ColumnType::SplitIndex32],
                vec![ColumnType::Index32],
            ],
        ),
        FieldKind::Root
        | FieldKind::Record(_)
        | FieldKind::Enum
        | FieldKind::Atomic
        | FieldKind::Array => ColumnRepresentations::empty(),
    }
}
