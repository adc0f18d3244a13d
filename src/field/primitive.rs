//! # Primitive and String Leaves
//!
//! One leaf kind per fundamental scalar. All of them are trivial types that
//! map 1:1 onto a single packed column, so append and read go through the
//! field base's fast paths; this module only supplies the per-type
//! representation tables and default values.
//!
//! The string leaf is the one non-mappable leaf: a collection offset column
//! plus a `uint8` payload column holding the UTF-8 bytes of each entry.

use eyre::Result;

use super::repr::ColumnRepresentations;
use super::{Field, FieldKind};
use crate::types::ColumnType;
use crate::value::Value;
use crate::{field_bail, field_err};

/// Fundamental scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Bool,
    Char,
    Byte,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// Cluster-size counter, u64-backed in memory.
    Index,
}

impl Primitive {
    pub(crate) fn from_type_name(name: &str) -> Option<Primitive> {
        Some(match name {
            "bool" => Primitive::Bool,
            "char" => Primitive::Char,
            "byte" => Primitive::Byte,
            "i8" => Primitive::I8,
            "u8" => Primitive::U8,
            "i16" => Primitive::I16,
            "u16" => Primitive::U16,
            "i32" => Primitive::I32,
            "u32" => Primitive::U32,
            "i64" => Primitive::I64,
            "u64" => Primitive::U64,
            "f32" => Primitive::F32,
            "f64" => Primitive::F64,
            "index" => Primitive::Index,
            _ => return None,
        })
    }

    /// In-memory size; alignment follows it.
    pub fn byte_size(self) -> usize {
        match self {
            Primitive::Bool | Primitive::Char | Primitive::Byte | Primitive::I8 | Primitive::U8 => {
                1
            }
            Primitive::I16 | Primitive::U16 => 2,
            Primitive::I32 | Primitive::U32 | Primitive::F32 => 4,
            Primitive::I64 | Primitive::U64 | Primitive::F64 | Primitive::Index => 8,
        }
    }

    /// Construct = zero-initialize.
    pub fn default_value(self) -> Value {
        match self {
            Primitive::Bool => Value::Bool(false),
            Primitive::Char | Primitive::I8 => Value::I8(0),
            Primitive::Byte | Primitive::U8 => Value::U8(0),
            Primitive::I16 => Value::I16(0),
            Primitive::U16 => Value::U16(0),
            Primitive::I32 => Value::I32(0),
            Primitive::U32 => Value::U32(0),
            Primitive::I64 => Value::I64(0),
            Primitive::U64 => Value::U64(0),
            Primitive::F32 => Value::F32(0.0),
            Primitive::F64 => Value::F64(0.0),
            Primitive::Index => Value::Index(0),
        }
    }

    /// The most compact split-encoded form is the default wherever one
    /// exists; the plain form stays available for uncompressed sinks.
    pub(crate) fn representations(self) -> ColumnRepresentations {
        use ColumnType::*;
        match self {
            Primitive::Bool => ColumnRepresentations::new(vec![vec![Bit]], vec![]),
            Primitive::Char | Primitive::I8 => {
                ColumnRepresentations::new(vec![vec![Int8]], vec![])
            }
            Primitive::Byte | Primitive::U8 => {
                ColumnRepresentations::new(vec![vec![UInt8]], vec![])
            }
            Primitive::I16 => {
                ColumnRepresentations::new(vec![vec![SplitInt16], vec![Int16]], vec![])
            }
            Primitive::U16 => {
                ColumnRepresentations::new(vec![vec![SplitUInt16], vec![UInt16]], vec![])
            }
            Primitive::I32 => {
                ColumnRepresentations::new(vec![vec![SplitInt32], vec![Int32]], vec![])
            }
            Primitive::U32 => {
                ColumnRepresentations::new(vec![vec![SplitUInt32], vec![UInt32]], vec![])
            }
            Primitive::I64 => {
                ColumnRepresentations::new(vec![vec![SplitInt64], vec![Int64]], vec![])
            }
            Primitive::U64 => {
                ColumnRepresentations::new(vec![vec![SplitUInt64], vec![UInt64]], vec![])
            }
            Primitive::F32 => {
                ColumnRepresentations::new(vec![vec![SplitReal32], vec![Real32]], vec![])
            }
            // reads a stream written at 32-bit precision into f64 values
            Primitive::F64 => ColumnRepresentations::new(
                vec![vec![SplitReal64], vec![Real64]],
                vec![vec![SplitReal32], vec![Real32]],
            ),
            Primitive::Index => ColumnRepresentations::new(
                vec![
                    vec![SplitIndex64],
                    vec![Index64],
                    vec![SplitIndex32],
                    vec![Index32],
                ],
                vec![],
            ),
        }
    }
}

impl Field {
    pub(crate) fn string_append(&mut self, from: &Value) -> Result<usize> {
        let Value::Str(s) = from else {
            field_bail!(
                InvalidArgument,
                "field '{}' expects a str value, got {}",
                self.name(),
                from.kind_name()
            );
        };
        let bytes = s.as_bytes();
        let mut written = 0;
        for b in bytes {
            written += self.columns[1].append_raw(std::slice::from_ref(b))?;
        }
        let FieldKind::String { n_written } = &mut self.kind else {
            unreachable!("string_append on a non-string field");
        };
        *n_written += bytes.len() as u64;
        let offset = *n_written;
        written += self.columns[0].append_index(offset)?;
        Ok(written)
    }

    pub(crate) fn string_read(&self, global: u64, to: &mut Value) -> Result<()> {
        let (start, size) = self.principal()?.collection_info(global)?;
        let mut buf = vec![0u8; size as usize];
        if size > 0 {
            self.columns[1].read_v(start, size as usize, &mut buf)?;
        }
        let s = String::from_utf8(buf)
            .map_err(|_| field_err!(Io, "string payload of '{}' is not utf-8", self.name()))?;
        *to = Value::Str(s);
        Ok(())
    }
}
