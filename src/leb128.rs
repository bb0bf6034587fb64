// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! LEB128 decoding and encoding.

use core::ops;

// A LEB128-encodable integral type.
pub(crate) trait Leb128:
    From<u8>                       //
    + ops::BitOrAssign             //
    + ops::Not<Output = Self>      //
    + ops::Shl<u32, Output = Self> //
{
    // The width of the type itself.
    const MAX_BITS: u32;
    const IS_SIGNED: bool;

    // Widens to i64, which holds every value of every implementor.
    fn widen(self) -> i64;
}

impl Leb128 for u32 {
    const MAX_BITS: u32 = 32;
    const IS_SIGNED: bool = false;

    fn widen(self) -> i64 {
        self.into()
    }
}

impl Leb128 for i32 {
    const MAX_BITS: u32 = 32;
    const IS_SIGNED: bool = true;

    fn widen(self) -> i64 {
        self.into()
    }
}

impl Leb128 for i64 {
    const MAX_BITS: u32 = 64;
    const IS_SIGNED: bool = true;

    fn widen(self) -> i64 {
        self
    }
}

// The value width of a signed block type.
const S33_BITS: u32 = 33;

// Error trait for LEB128 decoding failures.
pub(crate) trait Error {
    fn invalid_leb128() -> Self;
}

// Reads a LEB128-encoded value of the full width of `T`.
pub(crate) fn read<T, F, E>(read_byte: F) -> Result<T, E>
where
    T: Leb128,
    F: FnMut() -> Result<u8, E>,
    E: Error,
{
    read_bits(T::MAX_BITS, read_byte)
}

// Reads a signed 33-bit value (at most 5 bytes), as block types are encoded.
pub(crate) fn read_s33<F, E>(read_byte: F) -> Result<i64, E>
where
    F: FnMut() -> Result<u8, E>,
    E: Error,
{
    read_bits(S33_BITS, read_byte)
}

// Reads a LEB128-encoded value of `bits` bits into a `T` at least that wide.
//
// The encoding may span no more than `ceil(bits / 7)` bytes, and the unused
// bits of the final byte must be zero (unsigned) or copies of the sign bit
// (signed).
fn read_bits<T, F, E>(bits: u32, mut read_byte: F) -> Result<T, E>
where
    T: Leb128,
    F: FnMut() -> Result<u8, E>,
    E: Error,
{
    const CONTENT_MASK: u8 = 0x7f;
    const LAST_CHUNK_MASK: u8 = 0x80;
    const SIGN_EXTEND_MASK: u8 = 0x40;

    debug_assert!(bits <= T::MAX_BITS);

    let mut result = T::from(0);
    let mut shift = 0;
    let mut byte;

    loop {
        if shift >= bits {
            return Err(E::invalid_leb128());
        }

        byte = read_byte()?;
        let content = byte & CONTENT_MASK;

        if bits - shift < 7 {
            let remaining_bits = bits - shift;
            let valid = if T::IS_SIGNED {
                let mask = ((!0u8) << (remaining_bits - 1)) & CONTENT_MASK;
                let masked = content & mask;
                masked == 0 || masked == mask
            } else {
                content < (1u8 << remaining_bits)
            };
            if !valid {
                return Err(E::invalid_leb128());
            }
        }

        result |= T::from(content) << shift;
        shift += 7;

        if byte & LAST_CHUNK_MASK == 0 {
            break;
        }
    }

    // Sign extension fills the rest of `T`, not just the rest of `bits`.
    if T::IS_SIGNED && shift < T::MAX_BITS && (byte & SIGN_EXTEND_MASK) != 0 {
        result |= !T::from(0) << shift;
    }
    Ok(result)
}

// Write the minimal LEB128 encoding of a value using the provided byte sink.
//
// Emits 7-bit groups, least significant first, with the continuation bit set
// on all but the last. A signed encoding ends once the remaining value is
// pure sign extension of the last group's sign bit (bit 6).
pub(crate) fn write<T, F, E>(value: T, mut write_byte: F) -> Result<(), E>
where
    T: Leb128,
    F: FnMut(u8) -> Result<(), E>,
{
    const CONTENT_MASK: i64 = 0x7f;
    const CONTINUATION: u8 = 0x80;
    const SIGN_BIT: u8 = 0x40;

    let mut value = value.widen();
    loop {
        let byte = (value & CONTENT_MASK) as u8;
        // Arithmetic shift; unsigned values are never negative here.
        value >>= 7;
        let done = if T::IS_SIGNED {
            (value == 0 && byte & SIGN_BIT == 0) || (value == -1 && byte & SIGN_BIT != 0)
        } else {
            value == 0
        };
        if done {
            return write_byte(byte);
        }
        write_byte(byte | CONTINUATION)?;
    }
}
