//! State format tags.
//!
//! Each state block is tagged with a format code identifying the storage
//! encoding of the memory it points at. The primitive formats below are
//! understood by the [`StateBlock`](crate::StateBlock) codec; anything else
//! (composite device formats like a whole gamepad report) is opaque at this
//! layer and only ever byte-copied.

use crate::fourcc::FourCC;

/// Variable-width unsigned bitfield; all bits carry magnitude.
pub const BIT: FourCC = FourCC::new(*b"BIT ");

/// Variable-width sign-biased bitfield: the stored unsigned value minus the
/// half-range gives the logical signed value.
pub const SBIT: FourCC = FourCC::new(*b"SBIT");

/// 8-bit unsigned integer.
pub const BYTE: FourCC = FourCC::new(*b"BYTE");

/// 8-bit signed integer.
pub const SBYTE: FourCC = FourCC::new(*b"SBYT");

/// 16-bit signed integer.
pub const SHORT: FourCC = FourCC::new(*b"SHRT");

/// 16-bit unsigned integer.
pub const USHORT: FourCC = FourCC::new(*b"USHT");

/// 32-bit signed integer.
pub const INT: FourCC = FourCC::new(*b"INT ");

/// 32-bit unsigned integer.
pub const UINT: FourCC = FourCC::new(*b"UINT");

/// 64-bit signed integer.
pub const LONG: FourCC = FourCC::new(*b"LNG ");

/// 64-bit unsigned integer.
pub const ULONG: FourCC = FourCC::new(*b"ULNG");

/// IEEE 754 single-precision float.
pub const FLOAT: FourCC = FourCC::new(*b"FLT ");

/// IEEE 754 double-precision float.
pub const DOUBLE: FourCC = FourCC::new(*b"DBL ");

/// Two consecutive 32-bit floats.
pub const VECTOR2: FourCC = FourCC::new(*b"VEC2");

/// Three consecutive 32-bit floats.
pub const VECTOR3: FourCC = FourCC::new(*b"VEC3");

/// Canonical width in bits of a primitive format, `None` for unknown tags.
///
/// The bitfield formats report their minimum width of one bit; their actual
/// width is whatever the owning block declares.
pub fn primitive_size_in_bits(format: FourCC) -> Option<u32> {
    if format == BIT || format == SBIT {
        Some(1)
    } else if format == BYTE || format == SBYTE {
        Some(8)
    } else if format == SHORT || format == USHORT {
        Some(16)
    } else if format == INT || format == UINT || format == FLOAT {
        Some(32)
    } else if format == LONG || format == ULONG || format == DOUBLE || format == VECTOR2 {
        Some(64)
    } else if format == VECTOR3 {
        Some(96)
    } else {
        None
    }
}

/// Whether the format uses sub-byte addressing.
pub fn is_bitfield(format: FourCC) -> bool {
    format == BIT || format == SBIT
}
