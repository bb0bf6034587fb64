// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly binary format decoding and byte-exact re-encoding.
//!
//! A module decodes into a typed tree (see [`types`]) and encodes back into
//! the same bytes it came from:
//!
//! ```
//! let bytes = b"\0asm\x01\0\0\0\x01\x05\x01\x60\x00\x01\x7f";
//! let module = weft::decode(bytes).unwrap();
//! assert_eq!(module.sections.len(), 1);
//! assert_eq!(weft::encode(&module).unwrap().as_slice(), bytes);
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![cfg_attr(nightly, feature(allocator_api))]

#[cfg(nightly)]
extern crate alloc;

pub mod core_compat;
pub mod decode;
pub mod encode;
mod leb128;
pub mod storage;
pub mod types;

use core::fmt;

use core_compat::alloc::Global;
use core_compat::vec::Vec;
use decode::{ContextStack, decode_module};
use encode::{Encodable, Encoder};
use storage::{Buffer, Stream};
use types::{Magic, Section, Version};

/// A convenience trait that captures the required allocation-related trait
/// bounds.
pub trait Allocator: core_compat::alloc::Allocator + fmt::Debug + Clone {}

impl<A> Allocator for A where A: core_compat::alloc::Allocator + fmt::Debug + Clone {}

/// A WebAssembly module.
#[derive(Debug)]
pub struct Module<A: Allocator> {
    /// Leading magic bytes, as found.
    pub magic: Magic,
    /// Module version, as found.
    pub version: Version,
    /// Sections in the order they appear.
    pub sections: Vec<Section<A>, A>,
}

impl<A: Allocator> Module<A> {
    /// Decodes the module from streaming storage, with a given allocator.
    pub fn decode<Storage: Stream>(
        storage: Storage,
        alloc: A,
    ) -> Result<Self, decode::ErrorWithContext<Storage>> {
        let mut context = ContextStack::default();
        decode_module(storage, &mut context, alloc)
            .map_err(|error| decode::ErrorWithContext { error, context })
    }

    /// Decodes the module from in-memory bytes, with a given allocator.
    pub fn decode_bytes(
        bytes: &[u8],
        alloc: A,
    ) -> Result<Self, decode::ErrorWithContext<Buffer<&[u8]>>> {
        Self::decode(Buffer::new(bytes), alloc)
    }

    /// Encodes the module, allocating the output with the given allocator.
    pub fn encode<B: Allocator>(&self, alloc: B) -> Result<Vec<u8, B>, encode::Error> {
        let mut encoder = Encoder::new(alloc);
        Encodable::encode(self, &mut encoder)?;
        Ok(encoder.into_bytes())
    }
}

/// Decodes a module from in-memory bytes using the global allocator.
pub fn decode(bytes: &[u8]) -> Result<Module<Global>, decode::ErrorWithContext<Buffer<&[u8]>>> {
    Module::decode_bytes(bytes, Global)
}

/// Encodes a module using the global allocator.
pub fn encode<A: Allocator>(module: &Module<A>) -> Result<Vec<u8, Global>, encode::Error> {
    module.encode(Global)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExportDescriptor, Instruction, SectionId};

    // Exports a two-parameter i32 add.
    const ADD: &[u8] = &[
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
        0x01, 0x07, 0x01, 0x60, 0x02, 0x7f, 0x7f, 0x01, 0x7f, // type
        0x03, 0x02, 0x01, 0x00, // function
        0x07, 0x07, 0x01, 0x03, 0x61, 0x64, 0x64, 0x00, 0x00, // export
        0x0a, 0x09, 0x01, 0x07, 0x00, 0x20, 0x00, 0x20, 0x01, 0x6a, 0x0b, // code
    ];

    #[test]
    fn decode_add() {
        let module = decode(ADD).unwrap();
        let ids: std::vec::Vec<_> = module.sections.iter().map(Section::id).collect();
        assert_eq!(
            ids,
            [
                SectionId::Type,
                SectionId::Function,
                SectionId::Export,
                SectionId::Code
            ]
        );

        let Section::Export(exports) = &module.sections[2] else {
            panic!("expected an export section: {:?}", module.sections[2]);
        };
        assert_eq!(&**exports[0].field, "add");
        assert!(matches!(exports[0].descriptor, ExportDescriptor::Function(idx) if *idx == 0));

        let Section::Code(code) = &module.sections[3] else {
            panic!("expected a code section: {:?}", module.sections[3]);
        };
        assert!(matches!(
            code[0].body[..],
            [
                Instruction::LocalGet(_),
                Instruction::LocalGet(_),
                Instruction::I32Add
            ]
        ));
    }

    #[test]
    fn round_trip() {
        let module = decode(ADD).unwrap();
        let bytes = encode(&module).unwrap();
        assert_eq!(bytes.as_slice(), ADD);

        let again = encode(&decode(&bytes).unwrap()).unwrap();
        assert_eq!(again, bytes);
    }

    #[test]
    fn decode_errors_carry_context() {
        let mut bytes = ADD.to_vec();
        // i32.add -> i32.sub
        let last = bytes.len() - 2;
        bytes[last] = 0x6b;

        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err.error, decode::Error::InvalidOpcode(0x6b)));
        assert_eq!(err.offset(), Some(last));
        assert!(format!("{err:?}").contains("codesec"));
    }

    #[cfg(feature = "std")]
    #[test]
    fn decode_from_reader() {
        let module = Module::decode(storage::IoStream::new(ADD), Global).unwrap();
        assert_eq!(module.sections.len(), 4);
    }
}
