// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Storage abstraction for sequential binary data reading.
//!
//! Provides the [`Stream`] trait for reading binary data sequentially, with
//! an in-memory [`Buffer`] cursor and (with the `std` feature) an adapter for
//! `std::io` readers.

#[cfg(feature = "std")]
mod std;

#[cfg(feature = "std")]
pub use self::std::IoStream;

use core::fmt;

/// Storage abstraction for the streamed reading of a WASM module.
pub trait Stream {
    /// Error type for storage-specific failures.
    type Error: fmt::Debug;

    /// Whether the given error signifies a failure to read due to having
    /// reached the end of the stream (i.e., the "End Of the File").
    fn is_eof(err: &Self::Error) -> bool;

    /// Returns the current byte offset into the stream.
    fn offset(&mut self) -> usize;

    /// Reads a single byte from the stream.
    fn read_byte(&mut self) -> Result<u8, Self::Error>;

    /// Reads exactly `buf.len()` bytes into the provided buffer.
    ///
    /// Returns an error if EOF is reached or an I/O error occurs
    /// before the buffer is completely filled.
    ///
    /// Implementors should override for better performance.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        for byte in buf {
            *byte = self.read_byte()?;
        }
        Ok(())
    }
}

/// Represents attempting to read past the end of a buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MemoryEof {}

/// In-memory cursor over a fixed byte region.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Buffer<Bytes: AsRef<[u8]>> {
    bytes: Bytes,
    pos: usize,
}

impl<Bytes: AsRef<[u8]>> Buffer<Bytes> {
    /// Create a new buffer stream from the given bytes.
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes, pos: 0 }
    }

    /// The number of bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.bytes.as_ref().len() - self.pos
    }
}

impl<Bytes: AsRef<[u8]>> Stream for Buffer<Bytes> {
    type Error = MemoryEof;

    fn is_eof(_: &Self::Error) -> bool {
        true
    }

    fn offset(&mut self) -> usize {
        self.pos
    }

    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        let byte = *self.bytes.as_ref().get(self.pos).ok_or(MemoryEof {})?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        debug_assert!(self.pos <= self.bytes.as_ref().len());
        if buf.len() > self.remaining() {
            return Err(MemoryEof {});
        }
        let end = self.pos + buf.len();
        buf.copy_from_slice(&self.bytes.as_ref()[self.pos..end]);
        self.pos = end;
        Ok(())
    }
}
