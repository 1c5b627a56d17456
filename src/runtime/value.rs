//! Value synthesis (SPEC_FULL.md §4.6 "Value synthesis").
//!
//! Dispatch here is the same tagged-variant shape as [`crate::abi`]: one
//! arm per [`PrimitiveType`], not a generic `fn get_new_value<T>`. [`Scalar`]
//! is the runtime's notion of "a value of some primitive type", used both
//! for fabricated values and for values read back out of a heap region.

use crate::abi::PrimitiveType;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    I1(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    I128(i128),
    Ptr(u64),
    Float(f32),
    Double(f64),
    X86Fp80([u8; 16]),
}

impl Scalar {
    #[must_use]
    pub fn ty(&self) -> PrimitiveType {
        match self {
            Scalar::I1(_) => PrimitiveType::I1,
            Scalar::I8(_) => PrimitiveType::I8,
            Scalar::I16(_) => PrimitiveType::I16,
            Scalar::I32(_) => PrimitiveType::I32,
            Scalar::I64(_) => PrimitiveType::I64,
            Scalar::I128(_) => PrimitiveType::I128,
            Scalar::Ptr(_) => PrimitiveType::Ptr,
            Scalar::Float(_) => PrimitiveType::Float,
            Scalar::Double(_) => PrimitiveType::Double,
            Scalar::X86Fp80(_) => PrimitiveType::X86Fp80,
        }
    }

    #[must_use]
    pub fn to_le_bytes(self) -> Vec<u8> {
        match self {
            Scalar::I1(v) => vec![v as u8],
            Scalar::I8(v) => vec![v as u8],
            Scalar::I16(v) => v.to_le_bytes().to_vec(),
            Scalar::I32(v) => v.to_le_bytes().to_vec(),
            Scalar::I64(v) => v.to_le_bytes().to_vec(),
            Scalar::I128(v) => v.to_le_bytes().to_vec(),
            Scalar::Ptr(v) => v.to_le_bytes().to_vec(),
            Scalar::Float(v) => v.to_le_bytes().to_vec(),
            Scalar::Double(v) => v.to_le_bytes().to_vec(),
            Scalar::X86Fp80(bytes) => bytes.to_vec(),
        }
    }

    #[must_use]
    pub fn from_le_bytes(ty: PrimitiveType, bytes: &[u8]) -> Self {
        match ty {
            PrimitiveType::I1 => Scalar::I1(bytes[0] != 0),
            PrimitiveType::I8 => Scalar::I8(bytes[0] as i8),
            PrimitiveType::I16 => Scalar::I16(i16::from_le_bytes(bytes[..2].try_into().unwrap())),
            PrimitiveType::I32 => Scalar::I32(i32::from_le_bytes(bytes[..4].try_into().unwrap())),
            PrimitiveType::I64 => Scalar::I64(i64::from_le_bytes(bytes[..8].try_into().unwrap())),
            PrimitiveType::I128 => Scalar::I128(i128::from_le_bytes(bytes[..16].try_into().unwrap())),
            PrimitiveType::Ptr => Scalar::Ptr(u64::from_le_bytes(bytes[..8].try_into().unwrap())),
            PrimitiveType::Float => Scalar::Float(f32::from_le_bytes(bytes[..4].try_into().unwrap())),
            PrimitiveType::Double => Scalar::Double(f64::from_le_bytes(bytes[..8].try_into().unwrap())),
            PrimitiveType::X86Fp80 => Scalar::X86Fp80(bytes[..16].try_into().unwrap()),
        }
    }

    /// The value's bits, zero-extended into a 64-bit word — the encoding an
    /// `access_<T>` callback's `value` slot or an argument slot carries for
    /// any type that fits (SPEC_FULL.md §4.2 value encoding rule).
    #[must_use]
    pub fn as_i64_bits(&self) -> Option<i64> {
        match *self {
            Scalar::I1(v) => Some(v as i64),
            Scalar::I8(v) => Some(v as i64),
            Scalar::I16(v) => Some(v as i64),
            Scalar::I32(v) => Some(v as i64),
            Scalar::I64(v) => Some(v),
            Scalar::Ptr(v) => Some(v as i64),
            Scalar::Float(v) => Some(v.to_bits() as i64),
            Scalar::Double(v) => Some(v.to_bits() as i64),
            Scalar::I128(_) | Scalar::X86Fp80(_) => None,
        }
    }

    #[must_use]
    pub fn bit_pattern_as_u64(&self) -> Option<u64> {
        match *self {
            Scalar::Ptr(v) => Some(v),
            Scalar::I64(v) => Some(v as u64),
            _ => None,
        }
    }
}

/// Ceiling for fabricated bounded integers (SPEC_FULL.md §4.6, default
/// 1000).
pub const DEFAULT_INT_CEILING: i64 = 1000;

/// Synthesizes a fresh value of `ty`. Pointer synthesis needs to allocate a
/// fresh object, so it is handled by [`crate::runtime::state::RuntimeState`]
/// instead — this only covers the non-pointer primitives.
pub fn synthesize_non_pointer(rng: &mut impl Rng, ty: PrimitiveType, ceiling: i64) -> Scalar {
    match ty {
        PrimitiveType::I1 => Scalar::I1(rng.gen_bool(0.5)),
        PrimitiveType::I8 => Scalar::I8(rng.gen_range(0..ceiling) as i8),
        PrimitiveType::I16 => Scalar::I16((rng.gen_range(0..ceiling)) as i16),
        PrimitiveType::I32 => Scalar::I32(rng.gen_range(0..ceiling) as i32),
        PrimitiveType::I64 => Scalar::I64(rng.gen_range(0..ceiling)),
        PrimitiveType::I128 => Scalar::I128(rng.gen_range(0..ceiling) as i128),
        PrimitiveType::Float => Scalar::Float(rng.gen_range(0..ceiling) as f32),
        PrimitiveType::Double => Scalar::Double(rng.gen_range(0..ceiling) as f64),
        PrimitiveType::X86Fp80 => {
            let mut bytes = [0u8; 16];
            bytes[..8].copy_from_slice(&(rng.gen_range(0..ceiling) as f64).to_le_bytes());
            Scalar::X86Fp80(bytes)
        }
        PrimitiveType::Ptr => unreachable!("pointer synthesis allocates an object; see RuntimeState"),
    }
}
