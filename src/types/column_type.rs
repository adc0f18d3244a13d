//! # Physical Column Element Types
//!
//! Every column stream carries elements of exactly one `ColumnType`. The set
//! is closed: fields declare which sequences of these types they can be
//! serialized to (their representations), and the page store packs elements
//! accordingly.
//!
//! ## Element Categories
//!
//! | Category | Types | Packed size |
//! |----------|-------|-------------|
//! | Bit | `Bit` | 1 bit (byte-packed per page) |
//! | Integer | `Int8`..`UInt64` | 1-8 bytes |
//! | Float | `Real16`, `Real32`, `Real64` | 2-8 bytes |
//! | Collection offset | `Index32`, `Index64` | 4 / 8 bytes |
//! | Variant switch | `Switch` | 12 bytes (u64 index + u32 tag) |
//! | Split variants | `Split*` | as their plain counterpart |
//!
//! Split types store the same element values as their plain counterparts but
//! are byte-interleaved at the page level (and delta- or zigzag-transformed
//! where applicable) so that general-purpose compressors see long runs of
//! similar bytes. Every split type has a plain counterpart used when
//! compression or split encoding is disabled.

use std::fmt;

/// Physical element type of a column stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Bit,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Real16,
    Real32,
    Real64,
    Index32,
    Index64,
    Switch,
    SplitInt16,
    SplitUInt16,
    SplitInt32,
    SplitUInt32,
    SplitInt64,
    SplitUInt64,
    SplitReal16,
    SplitReal32,
    SplitReal64,
    SplitIndex32,
    SplitIndex64,
}

impl ColumnType {
    /// Number of bits one element occupies on storage.
    pub fn bits_on_storage(self) -> usize {
        match self {
            ColumnType::Bit => 1,
            ColumnType::Int8 | ColumnType::UInt8 => 8,
            ColumnType::Int16
            | ColumnType::UInt16
            | ColumnType::Real16
            | ColumnType::SplitInt16
            | ColumnType::SplitUInt16
            | ColumnType::SplitReal16 => 16,
            ColumnType::Int32
            | ColumnType::UInt32
            | ColumnType::Real32
            | ColumnType::Index32
            | ColumnType::SplitInt32
            | ColumnType::SplitUInt32
            | ColumnType::SplitReal32
            | ColumnType::SplitIndex32 => 32,
            ColumnType::Int64
            | ColumnType::UInt64
            | ColumnType::Real64
            | ColumnType::Index64
            | ColumnType::SplitInt64
            | ColumnType::SplitUInt64
            | ColumnType::SplitReal64
            | ColumnType::SplitIndex64 => 64,
            ColumnType::Switch => 96,
        }
    }

    /// Size in bytes of one packed element. `Bit` elements round up to one
    /// byte; page-level bit packing happens in the page store.
    pub fn packed_size(self) -> usize {
        self.bits_on_storage().div_ceil(8)
    }

    /// Whether this type uses the byte-interleaved page encoding.
    pub fn is_split(self) -> bool {
        matches!(
            self,
            ColumnType::SplitInt16
                | ColumnType::SplitUInt16
                | ColumnType::SplitInt32
                | ColumnType::SplitUInt32
                | ColumnType::SplitInt64
                | ColumnType::SplitUInt64
                | ColumnType::SplitReal16
                | ColumnType::SplitReal32
                | ColumnType::SplitReal64
                | ColumnType::SplitIndex32
                | ColumnType::SplitIndex64
        )
    }

    /// The unencoded counterpart of a split type; identity for plain types.
    pub fn to_plain(self) -> ColumnType {
        match self {
            ColumnType::SplitInt16 => ColumnType::Int16,
            ColumnType::SplitUInt16 => ColumnType::UInt16,
            ColumnType::SplitInt32 => ColumnType::Int32,
            ColumnType::SplitUInt32 => ColumnType::UInt32,
            ColumnType::SplitInt64 => ColumnType::Int64,
            ColumnType::SplitUInt64 => ColumnType::UInt64,
            ColumnType::SplitReal16 => ColumnType::Real16,
            ColumnType::SplitReal32 => ColumnType::Real32,
            ColumnType::SplitReal64 => ColumnType::Real64,
            ColumnType::SplitIndex32 => ColumnType::Index32,
            ColumnType::SplitIndex64 => ColumnType::Index64,
            other => other,
        }
    }

    /// Whether elements are collection offsets (cluster-local, monotone).
    pub fn is_index(self) -> bool {
        matches!(
            self.to_plain(),
            ColumnType::Index32 | ColumnType::Index64
        )
    }

    /// Whether elements of a signed integer split type get zigzag-coded
    /// before byte interleaving.
    pub(crate) fn is_zigzag(self) -> bool {
        matches!(
            self,
            ColumnType::SplitInt16 | ColumnType::SplitInt32 | ColumnType::SplitInt64
        )
    }

    /// Whether elements of an index split type get delta-coded before byte
    /// interleaving. Offsets are monotone within a cluster, so deltas stay
    /// small.
    pub(crate) fn is_delta(self) -> bool {
        matches!(self, ColumnType::SplitIndex32 | ColumnType::SplitIndex64)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Bit => "bit",
            ColumnType::Int8 => "int8",
            ColumnType::UInt8 => "uint8",
            ColumnType::Int16 => "int16",
            ColumnType::UInt16 => "uint16",
            ColumnType::Int32 => "int32",
            ColumnType::UInt32 => "uint32",
            ColumnType::Int64 => "int64",
            ColumnType::UInt64 => "uint64",
            ColumnType::Real16 => "real16",
            ColumnType::Real32 => "real32",
            ColumnType::Real64 => "real64",
            ColumnType::Index32 => "index32",
            ColumnType::Index64 => "index64",
            ColumnType::Switch => "switch",
            ColumnType::SplitInt16 => "splitint16",
            ColumnType::SplitUInt16 => "splituint16",
            ColumnType::SplitInt32 => "splitint32",
            ColumnType::SplitUInt32 => "splituint32",
            ColumnType::SplitInt64 => "splitint64",
            ColumnType::SplitUInt64 => "splituint64",
            ColumnType::SplitReal16 => "splitreal16",
            ColumnType::SplitReal32 => "splitreal32",
            ColumnType::SplitReal64 => "splitreal64",
            ColumnType::SplitIndex32 => "splitindex32",
            ColumnType::SplitIndex64 => "splitindex64",
        };
        f.write_str(name)
    }
}

/// Role of a field in the data model tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldStructure {
    Leaf,
    Record,
    Collection,
    Variant,
    UnsplitCollection,
}
