// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

use std::io;

use super::Stream;

/// Stream adapter for `std::io` readers (e.g., files), tracking the offset
/// itself so that no seeking is required.
#[derive(Debug)]
pub struct IoStream<R: io::Read> {
    reader: R,
    offset: usize,
}

impl<R: io::Read> IoStream<R> {
    /// Wraps a reader, treating its current position as offset 0.
    pub fn new(reader: R) -> Self {
        Self { reader, offset: 0 }
    }

    /// Unwraps the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: io::Read> Stream for IoStream<R> {
    type Error = io::Error;

    fn is_eof(err: &Self::Error) -> bool {
        err.kind() == io::ErrorKind::UnexpectedEof
    }

    fn offset(&mut self) -> usize {
        self.offset
    }

    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.reader.read_exact(buf)?;
        self.offset += buf.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_stream_tracks_offset_and_eof() {
        let mut stream = IoStream::new(io::Cursor::new(vec![0xaa, 0xbb]));
        assert_eq!(stream.read_byte().unwrap(), 0xaa);
        assert_eq!(stream.offset(), 1);
        assert_eq!(stream.read_byte().unwrap(), 0xbb);

        let err = stream.read_byte().unwrap_err();
        assert!(IoStream::<io::Cursor<Vec<u8>>>::is_eof(&err));
        assert_eq!(stream.offset(), 2);
    }
}
