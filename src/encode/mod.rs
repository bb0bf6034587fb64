// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly binary format encoding.
//!
//! Encoding mirrors decoding: every node writes itself into an [`Encoder`],
//! and every length prefix is computed from the freshly written content
//! rather than carried over from any decoded input.

mod encodable_impls;
mod expr;

use core::fmt;

use crate::Allocator;
use crate::core_compat::alloc::collections::TryReserveError;
use crate::core_compat::vec::Vec;
use crate::leb128::{self, Leb128};

/// Represents errors that can arise during encoding.
#[derive(Clone, Copy, Eq, PartialEq)]
pub enum Error {
    /// Failed memory allocation.
    AllocError,
    /// A vector or length-prefixed region too long for its u32 prefix.
    LengthOverflow(usize),
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AllocError => write!(f, "allocation failure"),
            Error::LengthOverflow(len) => write!(f, "length overflows u32 ({len:#x})"),
        }
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::AllocError
    }
}

/// A growable write cursor over encoded bytes.
pub struct Encoder<A: Allocator> {
    bytes: Vec<u8, A>,
}

impl<A: Allocator> Encoder<A> {
    pub fn new(alloc: A) -> Self {
        Self {
            bytes: Vec::new_in(alloc),
        }
    }

    /// The number of bytes written so far.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8, A> {
        self.bytes
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<(), Error> {
        self.bytes.try_reserve(1)?;
        self.bytes.push(byte);
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.bytes.try_reserve(bytes.len())?;
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }

    fn write_leb128<T: Leb128>(&mut self, value: T) -> Result<(), Error> {
        leb128::write(value, |byte| self.write_byte(byte))
    }

    /// Writes the minimal unsigned LEB128 encoding of `value`.
    pub fn write_u32(&mut self, value: u32) -> Result<(), Error> {
        self.write_leb128(value)
    }

    /// Writes the minimal signed LEB128 encoding of `value`.
    pub fn write_i32(&mut self, value: i32) -> Result<(), Error> {
        self.write_leb128(value)
    }

    /// Writes the minimal signed LEB128 encoding of `value`.
    pub fn write_i64(&mut self, value: i64) -> Result<(), Error> {
        self.write_leb128(value)
    }

    /// Writes a length as a u32 prefix.
    pub fn write_len(&mut self, len: usize) -> Result<(), Error> {
        let len = u32::try_from(len).map_err(|_| Error::LengthOverflow(len))?;
        self.write_u32(len)
    }

    /// Writes the element count followed by each element.
    pub fn write_vec<T, F>(&mut self, items: &[T], mut write: F) -> Result<(), Error>
    where
        F: FnMut(&mut Self, &T) -> Result<(), Error>,
    {
        self.write_len(items.len())?;
        for item in items {
            write(self, item)?;
        }
        Ok(())
    }

    /// Writes the UTF-8 byte length of `name` followed by its bytes.
    pub fn write_name(&mut self, name: &str) -> Result<(), Error> {
        self.write_len(name.len())?;
        self.write_bytes(name.as_bytes())
    }

    /// Appends everything written to `other`.
    pub fn append<B: Allocator>(&mut self, other: &Encoder<B>) -> Result<(), Error> {
        self.write_bytes(other.as_bytes())
    }

    /// Encodes into a fresh sub-encoder with `f`, then writes the resulting
    /// length as a u32 followed by the bytes themselves.
    pub fn write_framed<F>(&mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        let mut content = Self::new(self.bytes.allocator().clone());
        f(&mut content)?;
        self.write_len(content.len())?;
        self.append(&content)
    }
}

/// Types with a binary encoding.
pub trait Encodable {
    fn encode<A: Allocator>(&self, encoder: &mut Encoder<A>) -> Result<(), Error>;
}
