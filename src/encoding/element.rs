//! # Scalar Element Packing
//!
//! Packs one scalar value into the canonical little-endian byte form of a
//! column type, and unpacks it back into a destination [`Value`]. The
//! destination drives width conversion on read: a 64-bit float field reading
//! a `real32` column widens each element, which is how deserialization-only
//! representations work.
//!
//! ## Canonical Element Forms
//!
//! | Column type | Bytes | Contents |
//! |-------------|-------|----------|
//! | `bit` | 1 | 0 or 1 (page store packs 8 per byte) |
//! | integer / real | 1-8 | little-endian value |
//! | `real16` | 2 | IEEE 754 binary16 |
//! | `index32`/`index64` | 4 / 8 | little-endian offset |
//! | `switch` | 12 | u64 index, then u32 tag |

use eyre::Result;

use crate::types::{ColumnType, SwitchValue};
use crate::value::Value;
use crate::{field_bail, field_err};

/// Packs an unsigned counter (collection offset, cardinality source) into
/// an index column element.
pub fn pack_index(ty: ColumnType, v: u64, out: &mut [u8]) -> Result<()> {
    match ty.to_plain() {
        ColumnType::Index32 => {
            let narrow = u32::try_from(v)
                .map_err(|_| field_err!(InvalidArgument, "offset {v} exceeds index32 range"))?;
            out[..4].copy_from_slice(&narrow.to_le_bytes());
        }
        ColumnType::Index64 => out[..8].copy_from_slice(&v.to_le_bytes()),
        other => field_bail!(InvalidArgument, "column type {other} is not an index type"),
    }
    Ok(())
}

/// Unpacks an index column element.
pub fn unpack_index(ty: ColumnType, bytes: &[u8]) -> Result<u64> {
    match ty.to_plain() {
        ColumnType::Index32 => Ok(u32::from_le_bytes(bytes[..4].try_into()?) as u64),
        ColumnType::Index64 => Ok(u64::from_le_bytes(bytes[..8].try_into()?)),
        other => field_bail!(InvalidArgument, "column type {other} is not an index type"),
    }
}

pub fn pack_switch(v: SwitchValue, out: &mut [u8]) {
    out[..8].copy_from_slice(&v.index.to_le_bytes());
    out[8..12].copy_from_slice(&v.tag.to_le_bytes());
}

pub fn unpack_switch(bytes: &[u8]) -> Result<SwitchValue> {
    Ok(SwitchValue {
        index: u64::from_le_bytes(bytes[..8].try_into()?),
        tag: u32::from_le_bytes(bytes[8..12].try_into()?),
    })
}

/// Packs a scalar value into `out` (`ty.packed_size()` bytes). Numeric widths
/// must match the column type exactly, except reals: a 64-bit float value may
/// be written to a 32-bit real column (narrowing at the caller's request).
pub fn pack_scalar(ty: ColumnType, value: &Value, out: &mut [u8]) -> Result<()> {
    match (ty.to_plain(), value) {
        (ColumnType::Bit, Value::Bool(b)) => out[0] = *b as u8,
        (ColumnType::Int8, Value::I8(v)) => out[0] = *v as u8,
        (ColumnType::UInt8, Value::U8(v)) => out[0] = *v,
        (ColumnType::Int16, Value::I16(v)) => out[..2].copy_from_slice(&v.to_le_bytes()),
        (ColumnType::UInt16, Value::U16(v)) => out[..2].copy_from_slice(&v.to_le_bytes()),
        (ColumnType::Int32, Value::I32(v)) => out[..4].copy_from_slice(&v.to_le_bytes()),
        (ColumnType::UInt32, Value::U32(v)) => out[..4].copy_from_slice(&v.to_le_bytes()),
        (ColumnType::Int64, Value::I64(v)) => out[..8].copy_from_slice(&v.to_le_bytes()),
        (ColumnType::UInt64, Value::U64(v)) => out[..8].copy_from_slice(&v.to_le_bytes()),
        (ColumnType::Real16, Value::F32(v)) => {
            out[..2].copy_from_slice(&f32_to_f16_bits(*v).to_le_bytes())
        }
        (ColumnType::Real16, Value::F64(v)) => {
            out[..2].copy_from_slice(&f32_to_f16_bits(*v as f32).to_le_bytes())
        }
        (ColumnType::Real32, Value::F32(v)) => out[..4].copy_from_slice(&v.to_le_bytes()),
        (ColumnType::Real32, Value::F64(v)) => {
            out[..4].copy_from_slice(&(*v as f32).to_le_bytes())
        }
        (ColumnType::Real64, Value::F64(v)) => out[..8].copy_from_slice(&v.to_le_bytes()),
        (ColumnType::Index32 | ColumnType::Index64, Value::Index(v)) => {
            pack_index(ty, *v, out)?
        }
        (plain, value) => field_bail!(
            InvalidArgument,
            "cannot pack {} into a {plain} column",
            value.kind_name()
        ),
    }
    Ok(())
}

/// Unpacks one element into an existing destination value. The destination's
/// kind decides the in-memory width; mismatched kinds are rejected.
pub fn unpack_scalar(ty: ColumnType, bytes: &[u8], dest: &mut Value) -> Result<()> {
    match (ty.to_plain(), dest) {
        (ColumnType::Bit, Value::Bool(b)) => *b = bytes[0] != 0,
        (ColumnType::Int8, Value::I8(v)) => *v = bytes[0] as i8,
        (ColumnType::UInt8, Value::U8(v)) => *v = bytes[0],
        (ColumnType::Int16, Value::I16(v)) => *v = i16::from_le_bytes(bytes[..2].try_into()?),
        (ColumnType::UInt16, Value::U16(v)) => *v = u16::from_le_bytes(bytes[..2].try_into()?),
        (ColumnType::Int32, Value::I32(v)) => *v = i32::from_le_bytes(bytes[..4].try_into()?),
        (ColumnType::UInt32, Value::U32(v)) => *v = u32::from_le_bytes(bytes[..4].try_into()?),
        (ColumnType::Int64, Value::I64(v)) => *v = i64::from_le_bytes(bytes[..8].try_into()?),
        (ColumnType::UInt64, Value::U64(v)) => *v = u64::from_le_bytes(bytes[..8].try_into()?),
        (ColumnType::Real16, Value::F32(v)) => {
            *v = f16_bits_to_f32(u16::from_le_bytes(bytes[..2].try_into()?))
        }
        (ColumnType::Real16, Value::F64(v)) => {
            *v = f16_bits_to_f32(u16::from_le_bytes(bytes[..2].try_into()?)) as f64
        }
        (ColumnType::Real32, Value::F32(v)) => *v = f32::from_le_bytes(bytes[..4].try_into()?),
        (ColumnType::Real32, Value::F64(v)) => {
            *v = f32::from_le_bytes(bytes[..4].try_into()?) as f64
        }
        (ColumnType::Real64, Value::F64(v)) => *v = f64::from_le_bytes(bytes[..8].try_into()?),
        (ColumnType::Index32 | ColumnType::Index64, Value::Index(v)) => {
            *v = unpack_index(ty, bytes)?
        }
        (plain, dest) => field_bail!(
            InvalidArgument,
            "cannot unpack a {plain} element into {}",
            dest.kind_name()
        ),
    }
    Ok(())
}

/// IEEE 754 binary32 -> binary16, round-to-nearest-even.
pub fn f32_to_f16_bits(v: f32) -> u16 {
    let bits = v.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let frac = bits & 0x007f_ffff;

    if exp == 0xff {
        // Inf / NaN: keep a non-zero mantissa for NaN
        let nan_frac = if frac != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan_frac;
    }
    let unbiased = exp - 127;
    if unbiased > 15 {
        return sign | 0x7c00; // overflow to infinity
    }
    if unbiased < -24 {
        return sign; // underflow to zero
    }
    if unbiased < -14 {
        // subnormal half
        let shift = (-14 - unbiased) as u32;
        let mant = (frac | 0x0080_0000) >> (13 + shift);
        return sign | mant as u16;
    }
    let half_exp = ((unbiased + 15) as u32) << 10;
    let half_frac = frac >> 13;
    let round = (frac >> 12) & 1;
    (sign | (half_exp | half_frac) as u16).wrapping_add(round as u16)
}

/// IEEE 754 binary16 -> binary32.
pub fn f16_bits_to_f32(bits: u16) -> f32 {
    let sign = ((bits & 0x8000) as u32) << 16;
    let exp = ((bits >> 10) & 0x1f) as u32;
    let frac = (bits & 0x03ff) as u32;

    let out = if exp == 0 {
        if frac == 0 {
            sign
        } else {
            // subnormal: renormalize
            let shift = frac.leading_zeros() - 21;
            let mant = (frac << (shift + 1)) & 0x03ff;
            sign | ((113 - shift) << 23) | (mant << 13)
        }
    } else if exp == 0x1f {
        sign | 0x7f80_0000 | (frac << 13)
    } else {
        sign | ((exp + 112) << 23) | (frac << 13)
    };
    f32::from_bits(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trip_both_widths() {
        let mut buf = [0u8; 8];
        pack_index(ColumnType::Index32, 7, &mut buf).unwrap();
        assert_eq!(&buf[..4], &[7, 0, 0, 0]);
        assert_eq!(unpack_index(ColumnType::Index32, &buf).unwrap(), 7);

        pack_index(ColumnType::SplitIndex64, u64::MAX - 1, &mut buf).unwrap();
        assert_eq!(unpack_index(ColumnType::Index64, &buf).unwrap(), u64::MAX - 1);
    }

    #[test]
    fn index32_overflow_is_rejected() {
        let mut buf = [0u8; 4];
        assert!(pack_index(ColumnType::Index32, u64::from(u32::MAX) + 1, &mut buf).is_err());
    }

    #[test]
    fn switch_layout_is_index_then_tag() {
        let mut buf = [0u8; 12];
        pack_switch(SwitchValue::new(0x0102, 3), &mut buf);
        assert_eq!(buf, [0x02, 0x01, 0, 0, 0, 0, 0, 0, 3, 0, 0, 0]);
        let v = unpack_switch(&buf).unwrap();
        assert_eq!(v, SwitchValue::new(0x0102, 3));
        assert!(!v.is_valueless());
        assert!(SwitchValue::default().is_valueless());
    }

    #[test]
    fn real32_column_widens_into_f64_destination() {
        let mut buf = [0u8; 4];
        pack_scalar(ColumnType::Real32, &Value::F64(1.5), &mut buf).unwrap();
        let mut dest = Value::F64(0.0);
        unpack_scalar(ColumnType::Real32, &buf, &mut dest).unwrap();
        assert_eq!(dest, Value::F64(1.5));
    }

    #[test]
    fn kind_mismatch_is_invalid_argument() {
        let mut buf = [0u8; 4];
        let err = pack_scalar(ColumnType::Int32, &Value::F64(1.0), &mut buf).unwrap_err();
        assert_eq!(
            crate::error::kind_of(&err),
            Some(crate::error::ErrorKind::InvalidArgument)
        );
    }

    #[test]
    fn f16_round_trips_representable_values() {
        for v in [0.0f32, -0.0, 1.0, -2.5, 0.5, 65504.0, -65504.0] {
            assert_eq!(f16_bits_to_f32(f32_to_f16_bits(v)), v);
        }
        assert!(f16_bits_to_f32(f32_to_f16_bits(f32::NAN)).is_nan());
        assert_eq!(f16_bits_to_f32(f32_to_f16_bits(1.0e9)), f32::INFINITY);
    }
}
