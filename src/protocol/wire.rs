//! Wire type table
//!
//! Maps a field kind (plus an optional explicit override) onto one of the
//! fixed-width numeric encodings the format knows about. The table is closed.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::layout::FieldKind;
use super::value::Value;
use super::{CodecError, CodecResult};

/// Fixed-width numeric wire encodings (little-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum WireType {
    U8 = 0,
    I8 = 1,
    U16 = 2,
    I16 = 3,
    U32 = 4,
    I32 = 5,
    U64 = 6,
    I64 = 7,
    F32 = 8,
    F64 = 9,
}

impl WireType {
    /// Every wire type, in table order
    pub const ALL: [WireType; 10] = [
        WireType::U8,
        WireType::I8,
        WireType::U16,
        WireType::I16,
        WireType::U32,
        WireType::I32,
        WireType::U64,
        WireType::I64,
        WireType::F32,
        WireType::F64,
    ];

    /// Encoded width in bytes
    pub const fn size(self) -> usize {
        match self {
            WireType::U8 | WireType::I8 => 1,
            WireType::U16 | WireType::I16 => 2,
            WireType::U32 | WireType::I32 | WireType::F32 => 4,
            WireType::U64 | WireType::I64 | WireType::F64 => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, WireType::F32 | WireType::F64)
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            WireType::I8 | WireType::I16 | WireType::I32 | WireType::I64
        )
    }

    /// Inclusive range of representable integers, `None` for float types
    pub const fn integer_bounds(self) -> Option<(i128, i128)> {
        match self {
            WireType::U8 => Some((0, u8::MAX as i128)),
            WireType::I8 => Some((i8::MIN as i128, i8::MAX as i128)),
            WireType::U16 => Some((0, u16::MAX as i128)),
            WireType::I16 => Some((i16::MIN as i128, i16::MAX as i128)),
            WireType::U32 => Some((0, u32::MAX as i128)),
            WireType::I32 => Some((i32::MIN as i128, i32::MAX as i128)),
            WireType::U64 => Some((0, u64::MAX as i128)),
            WireType::I64 => Some((i64::MIN as i128, i64::MAX as i128)),
            WireType::F32 | WireType::F64 => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            WireType::U8 => "u8",
            WireType::I8 => "i8",
            WireType::U16 => "u16",
            WireType::I16 => "i16",
            WireType::U32 => "u32",
            WireType::I32 => "i32",
            WireType::U64 => "u64",
            WireType::I64 => "i64",
            WireType::F32 => "f32",
            WireType::F64 => "f64",
        }
    }

    /// Write an integer that has already been range-checked against
    /// [`integer_bounds`](Self::integer_bounds).
    pub(crate) fn put_int<B: BufMut>(self, value: i128, buf: &mut B) {
        match self {
            WireType::U8 => buf.put_u8(value as u8),
            WireType::I8 => buf.put_i8(value as i8),
            WireType::U16 => buf.put_u16_le(value as u16),
            WireType::I16 => buf.put_i16_le(value as i16),
            WireType::U32 => buf.put_u32_le(value as u32),
            WireType::I32 => buf.put_i32_le(value as i32),
            WireType::U64 => buf.put_u64_le(value as u64),
            WireType::I64 => buf.put_i64_le(value as i64),
            WireType::F32 => buf.put_f32_le(value as f32),
            WireType::F64 => buf.put_f64_le(value as f64),
        }
    }

    /// Write a float, narrowing to `f32` where the wire type asks for it.
    pub(crate) fn put_float<B: BufMut>(self, value: f64, buf: &mut B) {
        match self {
            WireType::F32 => buf.put_f32_le(value as f32),
            WireType::F64 => buf.put_f64_le(value),
            _ => self.put_int(value as i128, buf),
        }
    }

    /// Read one value. The caller guarantees `buf` holds at least
    /// [`size`](Self::size) bytes.
    pub(crate) fn read<B: Buf>(self, buf: &mut B) -> Value {
        match self {
            WireType::U8 => Value::Int(buf.get_u8().into()),
            WireType::I8 => Value::Int(buf.get_i8().into()),
            WireType::U16 => Value::Int(buf.get_u16_le().into()),
            WireType::I16 => Value::Int(buf.get_i16_le().into()),
            WireType::U32 => Value::Int(buf.get_u32_le().into()),
            WireType::I32 => Value::Int(buf.get_i32_le().into()),
            WireType::U64 => Value::Int(buf.get_u64_le().into()),
            WireType::I64 => Value::Int(buf.get_i64_le().into()),
            WireType::F32 => Value::Float(buf.get_f32_le().into()),
            WireType::F64 => Value::Float(buf.get_f64_le()),
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WireType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WireType::ALL
            .into_iter()
            .find(|wire| wire.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CodecError::UnknownWireType(s.to_string()))
    }
}

/// Resolve the wire type for a field.
///
/// An explicit override always wins. Otherwise integers default to `U32`,
/// floats to `F32` and booleans to a single `U8`; booleans only take that
/// width when they are not packed into a group by the planner.
pub fn resolve(kind: FieldKind, wire_override: Option<WireType>) -> CodecResult<WireType> {
    if let Some(wire) = wire_override {
        return Ok(wire);
    }

    match kind {
        FieldKind::Integer => Ok(WireType::U32),
        FieldKind::Float => Ok(WireType::F32),
        FieldKind::Boolean => Ok(WireType::U8),
        FieldKind::Text | FieldKind::Sequence => Err(CodecError::UnsupportedType(kind)),
    }
}
