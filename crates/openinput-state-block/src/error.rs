//! Error type for bit-addressed state access.

use crate::fourcc::FourCC;

/// Errors from reading or writing state through a block descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The format tag has no decoding on the requested access path.
    #[error("state format '{format}' is not supported as {access} format")]
    UnsupportedFormat {
        /// Format tag of the offending block.
        format: FourCC,
        /// Access path that was attempted (`"integer"`, `"floating-point"`, ...).
        access: &'static str,
    },

    /// The addressed bit range reaches outside the state buffer.
    #[error(
        "bit range at offset {bit_offset} ({size_in_bits} bits) is out of bounds \
         for a {buffer_len}-byte buffer"
    )]
    OutOfBounds {
        /// First bit of the range, relative to the buffer start.
        bit_offset: usize,
        /// Width of the range.
        size_in_bits: u32,
        /// Length of the buffer that was addressed.
        buffer_len: usize,
    },

    /// A bitfield access wider than the supported 32 bits (or zero bits wide).
    #[error("bitfield width of {size_in_bits} bits is not supported")]
    UnsupportedBitWidth {
        /// Requested width.
        size_in_bits: u32,
    },

    /// Byte-copying a sub-byte-addressed block is not defined.
    #[error("cannot byte-copy a bit-addressed state block")]
    BitfieldCopy,
}
