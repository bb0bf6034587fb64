// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Encodable trait implementations for WebAssembly types.

use crate::core_compat::vec::Vec;
use crate::types::*;
use crate::{Allocator, Module};

use super::{Encodable, Encoder, Error};

macro_rules! impl_encodable_for_u8_enum {
    ($type:ty) => {
        impl Encodable for $type {
            fn encode<A: Allocator>(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
                encoder.write_byte(*self as u8)
            }
        }
    };
}

macro_rules! impl_encodable_for_index {
    ($type:ty) => {
        impl Encodable for $type {
            fn encode<A: Allocator>(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
                encoder.write_u32(**self)
            }
        }
    };
}

macro_rules! impl_encodable_for_newtype {
    ($type:ident<B>) => {
        impl<B: Allocator> Encodable for $type<B> {
            fn encode<A: Allocator>(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
                (**self).encode(encoder)
            }
        }
    };
}

impl<T: Encodable, B: Allocator> Encodable for Vec<T, B> {
    fn encode<A: Allocator>(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_vec(self, |encoder, item| item.encode(encoder))
    }
}

impl_encodable_for_u8_enum!(ExportKind);
impl_encodable_for_u8_enum!(Opcode);
impl_encodable_for_u8_enum!(SectionId);
impl_encodable_for_u8_enum!(ValType);

impl_encodable_for_index!(FuncIdx);
impl_encodable_for_index!(GlobalIdx);
impl_encodable_for_index!(LabelIdx);
impl_encodable_for_index!(LocalIdx);
impl_encodable_for_index!(MemIdx);
impl_encodable_for_index!(TableIdx);
impl_encodable_for_index!(TypeIdx);

impl_encodable_for_newtype!(CodeSection<B>);
impl_encodable_for_newtype!(ExportSection<B>);
impl_encodable_for_newtype!(FunctionSection<B>);
impl_encodable_for_newtype!(ResultType<B>);
impl_encodable_for_newtype!(TypeSection<B>);

impl Encodable for BlockType {
    fn encode<A: Allocator>(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        match self {
            BlockType::Empty => encoder.write_byte(BlockType::EMPTY),
            BlockType::Result(valtype) => valtype.encode(encoder),
            BlockType::TypeIndex(idx) => encoder.write_i64((**idx).into()),
        }
    }
}

impl<B: Allocator> Encodable for Name<B> {
    fn encode<A: Allocator>(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_name(self)
    }
}

impl<B: Allocator> Encodable for FunctionType<B> {
    fn encode<A: Allocator>(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_byte(Self::TAG)?;
        self.parameters.encode(encoder)?;
        self.results.encode(encoder)
    }
}

impl Encodable for ExportDescriptor {
    fn encode<A: Allocator>(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        self.kind().encode(encoder)?;
        encoder.write_u32(self.index())
    }
}

impl<B: Allocator> Encodable for Export<B> {
    fn encode<A: Allocator>(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        self.field.encode(encoder)?;
        self.descriptor.encode(encoder)
    }
}

impl Encodable for Locals {
    fn encode<A: Allocator>(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_u32(self.count)?;
        self.ty.encode(encoder)
    }
}

// The body size is recomputed from the encoded locals and instructions.
impl<B: Allocator> Encodable for Function<B> {
    fn encode<A: Allocator>(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_framed(|encoder| {
            self.locals.encode(encoder)?;
            self.body.encode(encoder)
        })
    }
}

impl<B: Allocator> Encodable for Section<B> {
    fn encode<A: Allocator>(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        let id = self.id();
        id.encode(encoder)?;
        let start = encoder.len();
        encoder.write_framed(|encoder| match self {
            Section::Type(section) => section.encode(encoder),
            Section::Function(section) => section.encode(encoder),
            Section::Export(section) => section.encode(encoder),
            Section::Code(section) => section.encode(encoder),
        })?;
        log::debug!("encoded {id:?} section: {:#x} bytes", encoder.len() - start);
        Ok(())
    }
}

impl<B: Allocator> Encodable for Module<B> {
    fn encode<A: Allocator>(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encoder.write_bytes(&*self.magic)?;
        encoder.write_bytes(&*self.version)?;
        // Sections are concatenated without a count prefix.
        self.sections
            .iter()
            .try_for_each(|section| section.encode(encoder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_compat::alloc::Global;
    use crate::core_compat::boxed::Box;

    fn encoded<T: Encodable>(value: &T) -> std::vec::Vec<u8> {
        let mut encoder = Encoder::new(Global);
        value.encode(&mut encoder).unwrap();
        encoder.as_bytes().to_vec()
    }

    fn vec<T>(items: impl IntoIterator<Item = T>) -> Vec<T, Global> {
        let mut vec = Vec::new_in(Global);
        vec.extend(items);
        vec
    }

    fn name(s: &str) -> Name<Global> {
        Name::new(Box::from(s))
    }

    #[test]
    fn block_types() {
        assert_eq!(encoded(&BlockType::Empty), [0x40]);
        assert_eq!(encoded(&BlockType::Result(ValType::I64)), [0x7e]);
        assert_eq!(encoded(&BlockType::TypeIndex(TypeIdx::new(3))), [0x03]);
        assert_eq!(
            encoded(&BlockType::TypeIndex(TypeIdx::new(64))),
            [0xc0, 0x00]
        );
    }

    #[test]
    fn function_types() {
        let ty = FunctionType {
            parameters: ResultType::new(vec([ValType::I32, ValType::I32])),
            results: ResultType::new(vec([ValType::I32])),
        };
        assert_eq!(encoded(&ty), [0x60, 0x02, 0x7f, 0x7f, 0x01, 0x7f]);
    }

    #[test]
    fn exports() {
        let export = Export {
            field: name("add"),
            descriptor: ExportDescriptor::Function(FuncIdx::new(0)),
        };
        assert_eq!(encoded(&export), b"\x03add\x00\x00");

        let export = Export {
            field: name("g"),
            descriptor: ExportDescriptor::Global(GlobalIdx::new(130)),
        };
        assert_eq!(encoded(&export), b"\x01g\x03\x82\x01");
    }

    #[test]
    fn function_size_is_recomputed() {
        let function = Function {
            locals: vec([Locals {
                count: 1,
                ty: ValType::I32,
            }]),
            body: Expression::new(vec([
                Instruction::LocalGet(LocalIdx::new(0)),
                Instruction::LocalSet(LocalIdx::new(1)),
                Instruction::LocalGet(LocalIdx::new(1)),
            ])),
        };
        assert_eq!(
            encoded(&function),
            [0x0a, 0x01, 0x01, 0x7f, 0x20, 0x00, 0x21, 0x01, 0x20, 0x01, 0x0b]
        );
    }

    #[test]
    fn sections_are_framed() {
        let section: Section<Global> =
            Section::Function(FunctionSection::new(vec([TypeIdx::new(0)])));
        assert_eq!(encoded(&section), [0x03, 0x02, 0x01, 0x00]);

        let section: Section<Global> = Section::Export(ExportSection::new(vec([])));
        assert_eq!(encoded(&section), [0x07, 0x01, 0x00]);
    }

    #[test]
    fn modules() {
        let module = Module {
            magic: Magic::WASM,
            version: Version::V1,
            sections: vec([
                Section::Type(TypeSection::new(vec([FunctionType {
                    parameters: ResultType::new(vec([])),
                    results: ResultType::new(vec([ValType::I32])),
                }]))),
                Section::Function(FunctionSection::new(vec([TypeIdx::new(0)]))),
                Section::Code(CodeSection::new(vec([Function {
                    locals: vec([]),
                    body: Expression::new(vec([Instruction::I32Const(42)])),
                }]))),
            ]),
        };
        let expected: &[u8] = &[
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
            0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7f, // type
            0x03, 0x02, 0x01, 0x00, // function
            0x0a, 0x06, 0x01, 0x04, 0x00, 0x41, 0x2a, 0x0b, // code
        ];
        assert_eq!(encoded(&module), expected);
    }
}
