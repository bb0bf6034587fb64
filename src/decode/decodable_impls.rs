// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Decodable trait implementations for WebAssembly types.

use core::{ops, str};

use crate::Allocator;
use crate::core_compat::boxed::Box;
use crate::core_compat::vec::Vec;
use crate::storage::Stream;
use crate::types::*;

use super::expr::{Terminator, decode_expression};
use super::{BoundedDecodable, ContextId, ContextStack, Contextual, Decodable, Decoder, Error};

// The most elements a vector reserves before any of them are decoded.
const MAX_UPFRONT_RESERVATION: usize = 1024;

// Names are read in chunks of at most this many bytes.
const NAME_CHUNK_SIZE: usize = 0x1000;

macro_rules! impl_contextual {
    ($type:ident<A: Allocator>, $id:path) => {
        impl<A: Allocator> Contextual for $type<A> {
            const ID: ContextId = $id;
        }
    };
    (Vec<$type:ty, A>, $id:path) => {
        impl<A: Allocator> Contextual for Vec<$type, A> {
            const ID: ContextId = $id;
        }
    };
    ($type:ty, $id:path) => {
        impl Contextual for $type {
            const ID: ContextId = $id;
        }
    };
}

macro_rules! impl_decodable_for_u8_enum {
    ($type:ty, $make_err:path) => {
        impl BoundedDecodable for $type {
            fn decode<Storage: Stream>(
                decoder: &mut Decoder<Storage>,
                _: &mut ContextStack,
            ) -> Result<Self, Error<Storage>> {
                let byte = decoder.read_byte_raw()?;
                Self::try_from(byte).map_err(|_| $make_err(byte))
            }
        }
    };
}

macro_rules! impl_decodable_for_byte_array {
    ($type:ty) => {
        impl BoundedDecodable for $type {
            fn decode<Storage: Stream>(
                decoder: &mut Decoder<Storage>,
                _: &mut ContextStack,
            ) -> Result<Self, Error<Storage>> {
                let mut buf = [0u8; 4];
                decoder.read_exact_raw(&mut buf)?;
                Ok(Self::new(buf))
            }
        }
    };
}

macro_rules! impl_decodable_for_newtype {
    ($type:ident<A>) => {
        impl<A: Allocator> Decodable<A> for $type<A> {
            fn decode<Storage: Stream>(
                decoder: &mut Decoder<Storage>,
                context: &mut ContextStack,
                alloc: &A,
            ) -> Result<Self, Error<Storage>> {
                Ok(Self::new(<Self as ops::Deref>::Target::decode(
                    decoder, context, alloc,
                )?))
            }
        }
    };
    ($type:ident) => {
        impl BoundedDecodable for $type {
            fn decode<Storage: Stream>(
                decoder: &mut Decoder<Storage>,
                context: &mut ContextStack,
            ) -> Result<Self, Error<Storage>> {
                Ok(Self::new(
                    <<Self as ops::Deref>::Target as BoundedDecodable>::decode(decoder, context)?,
                ))
            }
        }
    };
}

impl<T, A> Decodable<A> for Vec<T, A>
where
    T: Decodable<A> + Contextual,
    A: Allocator,
{
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        let mut len: u32 = decoder.read_bounded(context)?;
        let mut vec = Vec::new_in(alloc.clone());

        // Every element occupies at least one byte, but a region's declared
        // length says nothing about how many bytes the stream actually holds.
        let reserve = match decoder.remaining() {
            Some(remaining) => remaining.min(len as usize),
            None => len as usize,
        };
        vec.try_reserve_exact(reserve.min(MAX_UPFRONT_RESERVATION))?;
        while len > 0 {
            let elem = decoder.read(context, alloc)?;
            vec.try_reserve(1)?;
            vec.push(elem);
            len -= 1;
        }
        Ok(vec)
    }
}

impl_contextual!(i32, ContextId::I32);
impl_contextual!(u32, ContextId::U32);
impl_contextual!(BlockType, ContextId::BlockType);
impl_contextual!(CodeSection<A: Allocator>, ContextId::CodeSec);
impl_contextual!(Export<A: Allocator>, ContextId::Export);
impl_contextual!(ExportDescriptor, ContextId::ExportDesc);
impl_contextual!(ExportKind, ContextId::ExportKind);
impl_contextual!(ExportSection<A: Allocator>, ContextId::ExportSec);
impl_contextual!(Expression<A: Allocator>, ContextId::Expr);
impl_contextual!(Function<A: Allocator>, ContextId::Func);
impl_contextual!(FunctionSection<A: Allocator>, ContextId::FuncSec);
impl_contextual!(FunctionType<A: Allocator>, ContextId::FuncType);
impl_contextual!(FuncIdx, ContextId::FuncIdx);
impl_contextual!(GlobalIdx, ContextId::GlobalIdx);
impl_contextual!(LabelIdx, ContextId::LabelIdx);
impl_contextual!(LocalIdx, ContextId::LocalIdx);
impl_contextual!(Locals, ContextId::Locals);
impl_contextual!(Magic, ContextId::Magic);
impl_contextual!(MemIdx, ContextId::MemIdx);
impl_contextual!(Name<A: Allocator>, ContextId::Name);
impl_contextual!(Opcode, ContextId::Opcode);
impl_contextual!(ResultType<A: Allocator>, ContextId::ResultType);
impl_contextual!(SectionId, ContextId::SectionId);
impl_contextual!(TableIdx, ContextId::TableIdx);
impl_contextual!(TypeIdx, ContextId::TypeIdx);
impl_contextual!(TypeSection<A: Allocator>, ContextId::TypeSec);
impl_contextual!(ValType, ContextId::ValType);
impl_contextual!(Vec<Export<A>, A>, ContextId::VecExport);
impl_contextual!(Vec<Function<A>, A>, ContextId::VecCode);
impl_contextual!(Vec<FunctionType<A>, A>, ContextId::VecFuncType);
impl_contextual!(Vec<Locals, A>, ContextId::VecLocals);
impl_contextual!(Vec<TypeIdx, A>, ContextId::VecTypeIdx);
impl_contextual!(Vec<ValType, A>, ContextId::VecValType);
impl_contextual!(Version, ContextId::Version);

impl_decodable_for_u8_enum!(ExportKind, Error::InvalidToken);
impl_decodable_for_u8_enum!(Opcode, Error::InvalidOpcode);
impl_decodable_for_u8_enum!(SectionId, Error::InvalidSectionId);
impl_decodable_for_u8_enum!(ValType, Error::InvalidValType);

impl_decodable_for_byte_array!(Magic);
impl_decodable_for_byte_array!(Version);

impl_decodable_for_newtype!(FuncIdx);
impl_decodable_for_newtype!(GlobalIdx);
impl_decodable_for_newtype!(LabelIdx);
impl_decodable_for_newtype!(LocalIdx);
impl_decodable_for_newtype!(MemIdx);
impl_decodable_for_newtype!(TableIdx);
impl_decodable_for_newtype!(TypeIdx);
impl_decodable_for_newtype!(CodeSection<A>);
impl_decodable_for_newtype!(ExportSection<A>);
impl_decodable_for_newtype!(FunctionSection<A>);
impl_decodable_for_newtype!(ResultType<A>);
impl_decodable_for_newtype!(TypeSection<A>);

impl BoundedDecodable for u32 {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        decoder.read_leb128_raw()
    }
}

impl BoundedDecodable for i32 {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        decoder.read_leb128_raw()
    }
}

// Block types are encoded as a signed 33-bit integer: a non-negative value is
// a type index, while the single-byte forms of the empty type and of value
// types land in the negative range.
impl BoundedDecodable for BlockType {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        _: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        let value = decoder.read_s33_raw()?;
        match value {
            -64..=-1 => {
                // Bytes 0x40-0x7f read back as `byte - 0x80`.
                let byte = (0x80 - value.unsigned_abs()) as u8;
                if byte == BlockType::EMPTY {
                    Ok(BlockType::Empty)
                } else {
                    ValType::try_from(byte)
                        .map(BlockType::Result)
                        .map_err(|_| Error::InvalidValType(byte))
                }
            }
            n => u32::try_from(n)
                .map(|idx| BlockType::TypeIndex(TypeIdx::new(idx)))
                .map_err(|_| Error::InvalidBlockType(n)),
        }
    }
}

impl<A: Allocator> Decodable<A> for Name<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        let len: u32 = decoder.read_bounded(context)?;
        let len = len as usize;
        decoder.check_fence(len)?;

        // Grow only as bytes actually arrive.
        let mut bytes = Vec::new_in(alloc.clone());
        let mut chunk = [0u8; NAME_CHUNK_SIZE];
        while bytes.len() < len {
            let chunk = &mut chunk[..(len - bytes.len()).min(NAME_CHUNK_SIZE)];
            decoder.read_exact(context, chunk)?;
            bytes.try_reserve(chunk.len())?;
            bytes.extend_from_slice(chunk);
        }

        str::from_utf8(&bytes).map_err(|_| Error::InvalidUtf8)?;
        let bytes_ptr = Box::into_raw(bytes.into_boxed_slice());

        // Safety: The ABIs of [u8] and str are identical, and we have already
        // validated that the byte sequence is valid UTF-8.
        let str = unsafe { Box::from_raw_in(bytes_ptr as *mut str, alloc.clone()) };
        Ok(Self::new(str))
    }
}

impl<A: Allocator> Decodable<A> for FunctionType<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        let tag = decoder.read_byte_raw()?;
        if tag != Self::TAG {
            return Err(Error::InvalidFuncType(tag));
        }
        Ok(Self {
            parameters: decoder.read(context, alloc)?,
            results: decoder.read(context, alloc)?,
        })
    }
}

impl BoundedDecodable for ExportDescriptor {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        match decoder.read_bounded(context)? {
            ExportKind::Function => Ok(ExportDescriptor::Function(decoder.read_bounded(context)?)),
            ExportKind::Table => Ok(ExportDescriptor::Table(decoder.read_bounded(context)?)),
            ExportKind::Memory => Ok(ExportDescriptor::Memory(decoder.read_bounded(context)?)),
            ExportKind::Global => Ok(ExportDescriptor::Global(decoder.read_bounded(context)?)),
        }
    }
}

impl<A: Allocator> Decodable<A> for Export<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        Ok(Self {
            field: decoder.read(context, alloc)?,
            descriptor: decoder.read_bounded(context)?,
        })
    }
}

impl BoundedDecodable for Locals {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>> {
        Ok(Self {
            count: decoder.read_bounded(context)?,
            ty: decoder.read_bounded(context)?,
        })
    }
}

// An expression read on its own must be closed by `end`.
impl<A: Allocator> Decodable<A> for Expression<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        match decode_expression(decoder, context, alloc)? {
            (expr, Terminator::End) => Ok(expr),
            (_, Terminator::Else) => Err(Error::UnexpectedElse),
        }
    }
}

impl<A: Allocator> Decodable<A> for Function<A> {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>> {
        let expected: u32 = decoder.read_bounded(context)?;
        let (function, actual) = decoder.fenced(context, expected, |decoder, context| {
            Ok(Self {
                locals: decoder.read(context, alloc)?,
                body: decoder.read(context, alloc)?,
            })
        })?;
        if expected != actual {
            return Err(Error::InvalidFunctionLength { expected, actual });
        }
        log::trace!(
            "decoded function: {} locals groups, {expected:#x} bytes",
            function.locals.len()
        );
        Ok(function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_compat::alloc::Global;
    use crate::storage::{Buffer, MemoryEof};

    type TestStorage = Buffer<&'static [u8]>;

    fn read<T: Decodable<Global> + Contextual>(
        bytes: &'static [u8],
    ) -> Result<T, Error<TestStorage>> {
        let mut decoder = Decoder::new(Buffer::new(bytes));
        decoder.read(&mut ContextStack::default(), &Global)
    }

    // Reads from within a fence spanning all of the given bytes.
    fn read_fenced<T: Decodable<Global> + Contextual>(
        bytes: &'static [u8],
    ) -> Result<T, Error<TestStorage>> {
        let mut decoder = Decoder::new(Buffer::new(bytes));
        let mut context = ContextStack::default();
        let (value, _) = decoder.fenced(&mut context, bytes.len() as u32, |decoder, context| {
            decoder.read(context, &Global)
        })?;
        Ok(value)
    }

    #[test]
    fn block_types() {
        assert_eq!(read::<BlockType>(&[0x40]), Ok(BlockType::Empty));
        assert_eq!(read::<BlockType>(&[0x7f]), Ok(BlockType::Result(ValType::I32)));
        assert_eq!(read::<BlockType>(&[0x6f]), Ok(BlockType::Result(ValType::ExternRef)));
        assert_eq!(read::<BlockType>(&[0x00]), Ok(BlockType::TypeIndex(TypeIdx::new(0))));
        assert_eq!(
            read::<BlockType>(&[0xff, 0x00]),
            Ok(BlockType::TypeIndex(TypeIdx::new(127)))
        );
        assert_eq!(read::<BlockType>(&[0x41]), Err(Error::InvalidValType(0x41)));
        // -65
        assert_eq!(read::<BlockType>(&[0xbf, 0x7f]), Err(Error::InvalidBlockType(-65)));
        assert_eq!(
            read::<BlockType>(&[0x80, 0x80, 0x80, 0x80, 0x78]),
            Err(Error::InvalidBlockType(-(1 << 31)))
        );
    }

    #[test]
    fn block_types_are_signed_33_bit() {
        assert_eq!(
            read::<BlockType>(&[0xff, 0xff, 0xff, 0xff, 0x0f]),
            Ok(BlockType::TypeIndex(TypeIdx::new(u32::MAX)))
        );
        // Padded forms of the single-byte encodings.
        assert_eq!(
            read::<BlockType>(&[0xff, 0xff, 0xff, 0xff, 0x7f]),
            Ok(BlockType::Result(ValType::I32))
        );
        assert_eq!(read::<BlockType>(&[0xc0, 0x7f]), Ok(BlockType::Empty));
        // 2^32 is out of range.
        assert_eq!(
            read::<BlockType>(&[0x80, 0x80, 0x80, 0x80, 0x10]),
            Err(Error::InvalidLeb128)
        );
        // A sixth byte is never read, even if it would make a valid i64.
        assert_eq!(
            read::<BlockType>(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00]),
            Err(Error::InvalidLeb128)
        );
    }

    #[test]
    fn value_types() {
        assert_eq!(read::<ValType>(&[0x7c]), Ok(ValType::F64));
        assert_eq!(read::<ValType>(&[0x70]), Ok(ValType::FuncRef));
        assert_eq!(read::<ValType>(&[0x7b]), Err(Error::InvalidValType(0x7b)));
    }

    #[test]
    fn names() {
        let name: Name<Global> = read(b"\x03add").unwrap();
        assert_eq!(&**name, "add");

        let empty: Name<Global> = read(b"\x00").unwrap();
        assert_eq!(&**empty, "");

        assert!(matches!(
            read::<Name<Global>>(b"\x02\xc3\x28"),
            Err(Error::InvalidUtf8)
        ));
        assert!(matches!(
            read::<Name<Global>>(b"\x05ab"),
            Err(Error::Storage(MemoryEof {}))
        ));
        assert!(matches!(
            read_fenced::<Name<Global>>(b"\x05ab"),
            Err(Error::BufferUnderrun)
        ));
    }

    #[test]
    fn function_types() {
        let ty: FunctionType<Global> = read(b"\x60\x02\x7f\x7e\x01\x7d").unwrap();
        assert_eq!(**ty.parameters, [ValType::I32, ValType::I64]);
        assert_eq!(**ty.results, [ValType::F32]);

        assert!(matches!(
            read::<FunctionType<Global>>(b"\x61\x00\x00"),
            Err(Error::InvalidFuncType(0x61))
        ));
    }

    #[test]
    fn exports() {
        let export: Export<Global> = read(b"\x03add\x00\x02").unwrap();
        assert_eq!(&**export.field, "add");
        assert_eq!(export.descriptor, ExportDescriptor::Function(FuncIdx::new(2)));

        let export: Export<Global> = read(b"\x03mem\x02\x00").unwrap();
        assert_eq!(export.descriptor, ExportDescriptor::Memory(MemIdx::new(0)));

        assert!(matches!(
            read::<Export<Global>>(b"\x01x\x04\x00"),
            Err(Error::InvalidToken(0x04))
        ));
    }

    #[test]
    fn functions() {
        // size 0x0a: one group of one i32 local; local.get 0; local.set 1;
        // local.get 1; end
        let function: Function<Global> =
            read(b"\x0a\x01\x01\x7f\x20\x00\x21\x01\x20\x01\x0b").unwrap();
        assert_eq!(
            *function.locals,
            [Locals {
                count: 1,
                ty: ValType::I32
            }]
        );
        assert_eq!(function.body.len(), 3);
        assert!(matches!(
            function.body[1],
            Instruction::LocalSet(idx) if *idx == 1
        ));

        // Run-length groups are kept as declared.
        let function: Function<Global> = read(b"\x06\x02\x02\x7f\x03\x7e\x0b").unwrap();
        assert_eq!(
            *function.locals,
            [
                Locals {
                    count: 2,
                    ty: ValType::I32
                },
                Locals {
                    count: 3,
                    ty: ValType::I64
                }
            ]
        );
    }

    #[test]
    fn function_length_must_match() {
        // Declared as 4 bytes, though the body ends after 2.
        assert!(matches!(
            read::<Function<Global>>(b"\x04\x00\x0b\x0b\x0b"),
            Err(Error::InvalidFunctionLength {
                expected: 4,
                actual: 2
            })
        ));
        // Declared as 2 bytes, though the body needs 4.
        assert!(matches!(
            read::<Function<Global>>(b"\x02\x00\x41\x01\x0b"),
            Err(Error::BufferUnderrun)
        ));
    }

    #[test]
    fn names_longer_than_a_chunk() {
        let len = NAME_CHUNK_SIZE * 2 + 3;
        assert_eq!(len, 0x2003);
        let mut bytes = std::vec![0x83, 0x40];
        bytes.resize(2 + len, b'x');
        let bytes: &'static [u8] = bytes.leak();

        let name: Name<Global> = read(bytes).unwrap();
        assert_eq!(name.len(), len);
        assert!(name.bytes().all(|b| b == b'x'));

        // Short by one, after two full chunks were read.
        assert!(matches!(
            read::<Name<Global>>(&bytes[..bytes.len() - 1]),
            Err(Error::Storage(MemoryEof {}))
        ));
    }

    #[test]
    fn vectors_are_bounded_by_their_region() {
        // A huge declared count only fails once elements run out.
        assert!(matches!(
            read_fenced::<Vec<TypeIdx, Global>>(b"\xff\xff\xff\xff\x0f\x00"),
            Err(Error::BufferUnderrun)
        ));
    }
}
