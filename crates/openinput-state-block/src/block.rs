//! The state block descriptor and its value codec.

use serde::{Deserialize, Serialize};

use crate::bits;
use crate::error::CodecError;
use crate::format;
use crate::fourcc::FourCC;

/// Coordinates of one control's value inside a device state buffer.
///
/// A `StateBlock` never owns memory; it is a coordinate into an externally
/// owned buffer and is meaningless without that buffer. Offsets are relative
/// to the owning device's state block, not to any global allocation.
///
/// For every non-bitfield format, `size_in_bits` matches the format's
/// canonical width and `bit_offset` is zero; only [`format::BIT`] and
/// [`format::SBIT`] blocks may start at a sub-byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBlock {
    /// Storage format tag of the addressed memory.
    pub format: FourCC,
    /// Byte offset from the device state base.
    pub byte_offset: u32,
    /// Bit offset from `byte_offset`, zero-based.
    pub bit_offset: u32,
    /// Width of the value in bits.
    pub size_in_bits: u32,
}

impl StateBlock {
    /// A block with explicit coordinates.
    pub const fn new(format: FourCC, byte_offset: u32, bit_offset: u32, size_in_bits: u32) -> Self {
        Self {
            format,
            byte_offset,
            bit_offset,
            size_in_bits,
        }
    }

    /// A byte-aligned block of a primitive format, sized to the format's
    /// canonical width. `None` for non-primitive format tags.
    pub fn primitive(format: FourCC, byte_offset: u32) -> Option<Self> {
        let size_in_bits = format::primitive_size_in_bits(format)?;
        Some(Self::new(format, byte_offset, 0, size_in_bits))
    }

    /// A bitfield block (`BIT ` format) at the given sub-byte position.
    pub const fn bitfield(byte_offset: u32, bit_offset: u32, size_in_bits: u32) -> Self {
        Self::new(format::BIT, byte_offset, bit_offset, size_in_bits)
    }

    /// Size of the block rounded up to whole bytes.
    pub const fn aligned_size_in_bytes(&self) -> u32 {
        self.size_in_bits.div_ceil(8)
    }

    /// Whether the block uses a sub-byte encoding.
    pub fn is_bitfield(&self) -> bool {
        format::is_bitfield(self.format)
    }

    /// Check the descriptor invariants: nonzero size; for primitive
    /// non-bitfield formats, canonical width and byte alignment.
    ///
    /// # Errors
    ///
    /// `UnsupportedBitWidth` for a zero-sized or mis-sized block,
    /// `UnsupportedFormat` for a byte-aligned format carrying a bit offset.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.size_in_bits == 0 {
            return Err(CodecError::UnsupportedBitWidth { size_in_bits: 0 });
        }
        if self.is_bitfield() {
            return Ok(());
        }
        if let Some(canonical) = format::primitive_size_in_bits(self.format) {
            if self.size_in_bits != canonical {
                return Err(CodecError::UnsupportedBitWidth {
                    size_in_bits: self.size_in_bits,
                });
            }
            if self.bit_offset != 0 {
                return Err(CodecError::UnsupportedFormat {
                    format: self.format,
                    access: "bit-addressed",
                });
            }
        }
        Ok(())
    }

    fn first_bit(&self) -> usize {
        self.byte_offset as usize * 8 + self.bit_offset as usize
    }

    // Byte-aligned formats must have bit_offset == 0; violating this is a
    // contract violation. Debug builds assert, release builds fall back to
    // the byte offset alone (bounded misbehavior, never out-of-bounds).
    fn require_byte_aligned(&self) {
        debug_assert!(
            self.bit_offset == 0,
            "format '{}' state must be byte-aligned",
            self.format
        );
    }

    fn byte_range<'a>(&self, state: &'a [u8], len: usize) -> Result<&'a [u8], CodecError> {
        let start = self.byte_offset as usize;
        state
            .get(start..start + len)
            .ok_or(CodecError::OutOfBounds {
                bit_offset: start * 8,
                size_in_bits: (len * 8) as u32,
                buffer_len: state.len(),
            })
    }

    fn byte_range_mut<'a>(
        &self,
        state: &'a mut [u8],
        len: usize,
    ) -> Result<&'a mut [u8], CodecError> {
        let start = self.byte_offset as usize;
        let buffer_len = state.len();
        state
            .get_mut(start..start + len)
            .ok_or(CodecError::OutOfBounds {
                bit_offset: start * 8,
                size_in_bits: (len * 8) as u32,
                buffer_len,
            })
    }

    /// Read the block as a signed 32-bit integer.
    ///
    /// Supported formats: the bitfields and the 8/16/32-bit integers. The
    /// 64-bit integers live on [`read_long`](Self::read_long); floats have no
    /// integer decoding.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` for formats without an integer decoding,
    /// `OutOfBounds` when the block reaches outside `state`.
    pub fn read_int(&self, state: &[u8]) -> Result<i32, CodecError> {
        debug_assert!(self.size_in_bits != 0, "state block has zero size");
        let f = self.format;
        if f == format::BIT {
            if self.size_in_bits == 1 {
                return Ok(i32::from(bits::read_bit(state, self.first_bit())?));
            }
            return Ok(bits::read_bits(state, self.first_bit(), self.size_in_bits)? as i32);
        }
        if f == format::SBIT {
            if self.size_in_bits == 1 {
                return Ok(if bits::read_bit(state, self.first_bit())? {
                    1
                } else {
                    -1
                });
            }
            return bits::read_bits_excess_k(state, self.first_bit(), self.size_in_bits);
        }

        self.require_byte_aligned();
        if f == format::BYTE {
            let b = self.byte_range(state, 1)?;
            Ok(i32::from(b[0]))
        } else if f == format::SBYTE {
            let b = self.byte_range(state, 1)?;
            Ok(i32::from(b[0] as i8))
        } else if f == format::SHORT {
            let b = self.byte_range(state, 2)?;
            Ok(i32::from(i16::from_le_bytes([b[0], b[1]])))
        } else if f == format::USHORT {
            let b = self.byte_range(state, 2)?;
            Ok(i32::from(u16::from_le_bytes([b[0], b[1]])))
        } else if f == format::INT {
            let b = self.byte_range(state, 4)?;
            Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        } else if f == format::UINT {
            let b = self.byte_range(state, 4)?;
            let value = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            debug_assert!(value <= i32::MAX as u32, "UINT value must fit in an i32");
            Ok(value as i32)
        } else {
            Err(CodecError::UnsupportedFormat {
                format: f,
                access: "integer",
            })
        }
    }

    /// Write the block from a signed 32-bit integer.
    ///
    /// # Errors
    ///
    /// Mirror image of [`read_int`](Self::read_int).
    pub fn write_int(&self, state: &mut [u8], value: i32) -> Result<(), CodecError> {
        debug_assert!(self.size_in_bits != 0, "state block has zero size");
        let f = self.format;
        if f == format::BIT {
            if self.size_in_bits == 1 {
                return bits::write_bit(state, self.first_bit(), value != 0);
            }
            return bits::write_bits(state, self.first_bit(), self.size_in_bits, value as u32);
        }
        if f == format::SBIT {
            if self.size_in_bits == 1 {
                return bits::write_bit(state, self.first_bit(), value > 0);
            }
            return bits::write_bits_excess_k(state, self.first_bit(), self.size_in_bits, value);
        }

        self.require_byte_aligned();
        if f == format::BYTE {
            let b = self.byte_range_mut(state, 1)?;
            b[0] = value as u8;
            Ok(())
        } else if f == format::SBYTE {
            let b = self.byte_range_mut(state, 1)?;
            b[0] = (value as i8) as u8;
            Ok(())
        } else if f == format::SHORT {
            let b = self.byte_range_mut(state, 2)?;
            b.copy_from_slice(&(value as i16).to_le_bytes());
            Ok(())
        } else if f == format::USHORT {
            let b = self.byte_range_mut(state, 2)?;
            b.copy_from_slice(&(value as u16).to_le_bytes());
            Ok(())
        } else if f == format::INT || f == format::UINT {
            let b = self.byte_range_mut(state, 4)?;
            b.copy_from_slice(&value.to_le_bytes());
            Ok(())
        } else {
            Err(CodecError::UnsupportedFormat {
                format: f,
                access: "integer",
            })
        }
    }

    /// Read the block as a signed 64-bit integer.
    ///
    /// Like [`read_int`](Self::read_int) but additionally decodes the 64-bit
    /// integer formats.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` for float formats, `OutOfBounds` as usual.
    pub fn read_long(&self, state: &[u8]) -> Result<i64, CodecError> {
        let f = self.format;
        if f == format::LONG {
            self.require_byte_aligned();
            let b = self.byte_range(state, 8)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(b);
            return Ok(i64::from_le_bytes(raw));
        }
        if f == format::ULONG {
            self.require_byte_aligned();
            let b = self.byte_range(state, 8)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(b);
            let value = u64::from_le_bytes(raw);
            debug_assert!(value <= i64::MAX as u64, "ULNG value must fit in an i64");
            return Ok(value as i64);
        }
        Ok(i64::from(self.read_int(state)?))
    }

    /// Write the block from a signed 64-bit integer.
    ///
    /// # Errors
    ///
    /// Mirror image of [`read_long`](Self::read_long).
    pub fn write_long(&self, state: &mut [u8], value: i64) -> Result<(), CodecError> {
        let f = self.format;
        if f == format::LONG || f == format::ULONG {
            self.require_byte_aligned();
            let b = self.byte_range_mut(state, 8)?;
            b.copy_from_slice(&value.to_le_bytes());
            return Ok(());
        }
        self.write_int(state, value as i32)
    }

    /// Read the block as a normalized 32-bit float.
    ///
    /// Bitfields normalize to `[0, 1]` (`BIT`) or `[-1, 1]` (`SBIT`). Signed
    /// fixed-width integers divide by the format's half-range
    /// (`i16 / 32768.0`, `i32 / 2147483648.0`, ...): the result reaches -1.0
    /// exactly while +1.0 is unreachable. The asymmetry is deliberate
    /// legacy-compatible behavior that downstream calibration depends on; do
    /// not "fix" it. Unsigned integers divide by the format's maximum, giving
    /// `[0, 1]`. Float formats pass through.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` for unknown format tags, `OutOfBounds` as usual.
    pub fn read_float(&self, state: &[u8]) -> Result<f32, CodecError> {
        debug_assert!(self.size_in_bits != 0, "state block has zero size");
        let f = self.format;
        if f == format::BIT {
            if self.size_in_bits == 1 {
                return Ok(if bits::read_bit(state, self.first_bit())? {
                    1.0
                } else {
                    0.0
                });
            }
            return bits::read_bits_normalized(state, self.first_bit(), self.size_in_bits);
        }
        if f == format::SBIT {
            if self.size_in_bits == 1 {
                return Ok(if bits::read_bit(state, self.first_bit())? {
                    1.0
                } else {
                    -1.0
                });
            }
            let normalized =
                bits::read_bits_normalized(state, self.first_bit(), self.size_in_bits)?;
            return Ok((normalized * 2.0 - 1.0).clamp(-1.0, 1.0));
        }

        self.require_byte_aligned();
        if f == format::SBYTE {
            let b = self.byte_range(state, 1)?;
            Ok(f32::from(b[0] as i8) / 128.0)
        } else if f == format::BYTE {
            let b = self.byte_range(state, 1)?;
            Ok(f32::from(b[0]) / 255.0)
        } else if f == format::SHORT {
            let b = self.byte_range(state, 2)?;
            Ok(f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        } else if f == format::USHORT {
            let b = self.byte_range(state, 2)?;
            Ok(f32::from(u16::from_le_bytes([b[0], b[1]])) / 65535.0)
        } else if f == format::INT {
            let b = self.byte_range(state, 4)?;
            Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2_147_483_648.0)
        } else if f == format::UINT {
            let b = self.byte_range(state, 4)?;
            Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 4_294_967_295.0)
        } else if f == format::LONG {
            Ok(self.read_long(state)? as f32 / 9.223_372e18)
        } else if f == format::ULONG {
            let b = self.byte_range(state, 8)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(b);
            Ok(u64::from_le_bytes(raw) as f32 / u64::MAX as f32)
        } else if f == format::FLOAT {
            let b = self.byte_range(state, 4)?;
            Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        } else if f == format::DOUBLE {
            let b = self.byte_range(state, 8)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(b);
            Ok(f64::from_le_bytes(raw) as f32)
        } else {
            Err(CodecError::UnsupportedFormat {
                format: f,
                access: "floating-point",
            })
        }
    }

    /// Write the block from a normalized 32-bit float.
    ///
    /// Inverse of [`read_float`](Self::read_float): signed integers scale by
    /// the half-range and clamp to the representable range (so +1.0 lands on
    /// the format maximum even though reading it back yields slightly less
    /// than 1.0), unsigned integers scale by the maximum, bitfields quantize.
    ///
    /// # Errors
    ///
    /// Mirror image of [`read_float`](Self::read_float).
    pub fn write_float(&self, state: &mut [u8], value: f32) -> Result<(), CodecError> {
        let f = self.format;
        if f == format::BIT {
            if self.size_in_bits == 1 {
                return bits::write_bit(state, self.first_bit(), value >= 0.5);
            }
            return bits::write_bits_normalized(state, self.first_bit(), self.size_in_bits, value);
        }
        if f == format::SBIT {
            if self.size_in_bits == 1 {
                return bits::write_bit(state, self.first_bit(), value >= 0.0);
            }
            return bits::write_bits_normalized(
                state,
                self.first_bit(),
                self.size_in_bits,
                value * 0.5 + 0.5,
            );
        }

        self.require_byte_aligned();
        if f == format::SBYTE {
            let scaled = (f64::from(value) * 128.0).round() as i8;
            let b = self.byte_range_mut(state, 1)?;
            b[0] = scaled as u8;
            Ok(())
        } else if f == format::BYTE {
            let scaled = (f64::from(value.clamp(0.0, 1.0)) * 255.0).round() as u8;
            let b = self.byte_range_mut(state, 1)?;
            b[0] = scaled;
            Ok(())
        } else if f == format::SHORT {
            let scaled = (f64::from(value) * 32768.0).round() as i16;
            let b = self.byte_range_mut(state, 2)?;
            b.copy_from_slice(&scaled.to_le_bytes());
            Ok(())
        } else if f == format::USHORT {
            let scaled = (f64::from(value.clamp(0.0, 1.0)) * 65535.0).round() as u16;
            let b = self.byte_range_mut(state, 2)?;
            b.copy_from_slice(&scaled.to_le_bytes());
            Ok(())
        } else if f == format::INT {
            let scaled = (f64::from(value) * 2_147_483_648.0).round() as i32;
            let b = self.byte_range_mut(state, 4)?;
            b.copy_from_slice(&scaled.to_le_bytes());
            Ok(())
        } else if f == format::UINT {
            let scaled = (f64::from(value.clamp(0.0, 1.0)) * 4_294_967_295.0).round() as u32;
            let b = self.byte_range_mut(state, 4)?;
            b.copy_from_slice(&scaled.to_le_bytes());
            Ok(())
        } else if f == format::LONG {
            let scaled = (f64::from(value) * 9.223_372_036_854_776e18).round() as i64;
            let b = self.byte_range_mut(state, 8)?;
            b.copy_from_slice(&scaled.to_le_bytes());
            Ok(())
        } else if f == format::ULONG {
            let scaled = (f64::from(value.clamp(0.0, 1.0)) * u64::MAX as f64).round() as u64;
            let b = self.byte_range_mut(state, 8)?;
            b.copy_from_slice(&scaled.to_le_bytes());
            Ok(())
        } else if f == format::FLOAT {
            let b = self.byte_range_mut(state, 4)?;
            b.copy_from_slice(&value.to_le_bytes());
            Ok(())
        } else if f == format::DOUBLE {
            let b = self.byte_range_mut(state, 8)?;
            b.copy_from_slice(&f64::from(value).to_le_bytes());
            Ok(())
        } else {
            Err(CodecError::UnsupportedFormat {
                format: f,
                access: "floating-point",
            })
        }
    }

    /// Read the block as a 64-bit float. Same normalization rules as
    /// [`read_float`](Self::read_float); `DBL` passes through losslessly.
    ///
    /// # Errors
    ///
    /// Same as [`read_float`](Self::read_float).
    pub fn read_double(&self, state: &[u8]) -> Result<f64, CodecError> {
        let f = self.format;
        if f == format::DOUBLE {
            self.require_byte_aligned();
            let b = self.byte_range(state, 8)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(b);
            return Ok(f64::from_le_bytes(raw));
        }
        if f == format::FLOAT {
            self.require_byte_aligned();
            let b = self.byte_range(state, 4)?;
            return Ok(f64::from(f32::from_le_bytes([b[0], b[1], b[2], b[3]])));
        }
        Ok(f64::from(self.read_float(state)?))
    }

    /// Write the block from a 64-bit float. `DBL` stores the value
    /// losslessly; everything else goes through the `f32` write path.
    ///
    /// # Errors
    ///
    /// Same as [`write_float`](Self::write_float).
    pub fn write_double(&self, state: &mut [u8], value: f64) -> Result<(), CodecError> {
        let f = self.format;
        if f == format::DOUBLE {
            self.require_byte_aligned();
            let b = self.byte_range_mut(state, 8)?;
            b.copy_from_slice(&value.to_le_bytes());
            return Ok(());
        }
        self.write_float(state, value as f32)
    }

    /// Copy this block's bytes from one state buffer to another.
    ///
    /// This is the single bounds-checked primitive all byte-wise state
    /// copies go through.
    ///
    /// # Errors
    ///
    /// `BitfieldCopy` for sub-byte blocks, `OutOfBounds` when either buffer
    /// is too small.
    pub fn copy_to_from(&self, to: &mut [u8], from: &[u8]) -> Result<(), CodecError> {
        if self.bit_offset != 0 || self.size_in_bits % 8 != 0 {
            return Err(CodecError::BitfieldCopy);
        }
        let len = self.aligned_size_in_bytes() as usize;
        let src = self.byte_range(from, len)?;
        // Split borrows: `src` must be copied out before `to` is sliced, or
        // hold both via the checked ranges below.
        let start = self.byte_offset as usize;
        let buffer_len = to.len();
        let dst = to
            .get_mut(start..start + len)
            .ok_or(CodecError::OutOfBounds {
                bit_offset: start * 8,
                size_in_bits: (len * 8) as u32,
                buffer_len,
            })?;
        dst.copy_from_slice(src);
        Ok(())
    }
}
