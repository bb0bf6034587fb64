// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly type definitions.
//!
//! This module contains the typed tree that a module decodes into and
//! encodes from: value types, function signatures, exports, function bodies,
//! and the sections that hold them.

use core::cmp;

use num_enum::TryFromPrimitive;

use crate::Allocator;
use crate::core_compat::boxed::Box;
use crate::core_compat::vec::Vec;

// Defines a public newtype without public mutable access to the underlying
// type, along with some convenience trait implementations like Deref and AsRef.
macro_rules! newtype {
    (
        $(#[$meta:meta])*
        pub struct $type:ident<A: Allocator>($underlying:ty);
    ) => {
        $(#[$meta])*
        pub struct $type<A: Allocator>($underlying);

        newtype!(@impl [A: Allocator], $type<A>, $underlying);
    };
    (
        $(#[$meta:meta])*
        pub struct $type:ident($underlying:ty);
    ) => {
        $(#[$meta])*
        pub struct $type($underlying);

        newtype!(@impl [], $type, $underlying);
    };
    (@impl [$($generic_params:tt)*], $qualified_type:ty, $underlying:ty) => {
        impl<$($generic_params)*> $qualified_type {
            pub fn new(value: $underlying) -> Self {
                Self(value)
            }

            /// Consumes the newtype, returning the underlying value.
            pub fn into_inner(self) -> $underlying {
                self.0
            }
        }

        impl<$($generic_params)*> ::core::ops::Deref for $qualified_type {
            type Target = $underlying;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl<$($generic_params)*> AsRef<$underlying> for $qualified_type {
            fn as_ref(&self) -> &$underlying {
                &self.0
            }
        }
    };
}
pub(crate) use newtype;

mod instr;
pub use instr::*;

newtype!(
    /// The leading four bytes of a module, kept verbatim.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Magic([u8; 4]);
);

impl Magic {
    /// '\0asm'
    pub const WASM: Self = Self(*b"\0asm");
}

newtype!(
    /// The four version bytes following the magic, kept verbatim.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Version([u8; 4]);
);

impl Version {
    /// Version 1, little-endian.
    pub const V1: Self = Self([0x01, 0x00, 0x00, 0x00]);
}

newtype!(
    /// A name (of an export).
    #[derive(Debug, Eq, PartialEq)]
    pub struct Name<A: Allocator>(Box<str, A>);
);

/// The type of a reference to an object in the runtime store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum RefType {
    /// Function reference type.
    Func = 0x70,
    /// External reference type.
    Extern = 0x6f,
}

/// Value types classify the individual values that WebAssembly code can compute
/// with and the values that a variable accepts.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum ValType {
    /// 32-bit signed integer.
    I32 = 0x7f,
    /// 64-bit signed integer.
    I64 = 0x7e,
    /// 32-bit floating point number.
    F32 = 0x7d,
    /// 64-bit floating point number.
    F64 = 0x7c,
    /// Function reference.
    FuncRef = RefType::Func as u8,
    /// External reference.
    ExternRef = RefType::Extern as u8,
}

newtype!(
    /// The sequence of types representing the result of executing instructions
    /// or functions.
    #[derive(Clone, Debug)]
    pub struct ResultType<A: Allocator>(Vec<ValType, A>);
);

/// The signature of a function, mapping parameters to results.
#[derive(Clone, Debug)]
pub struct FunctionType<A: Allocator> {
    pub parameters: ResultType<A>,
    pub results: ResultType<A>,
}

impl<A: Allocator> FunctionType<A> {
    /// The tag byte preceding every function type.
    pub const TAG: u8 = 0x60;
}

newtype!(
    /// An index into the type section.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct TypeIdx(u32);
);

newtype!(
    /// An index into the function index space.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct FuncIdx(u32);
);

newtype!(
    /// An index into the table index space.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct TableIdx(u32);
);

newtype!(
    /// An index into the memory index space.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct MemIdx(u32);
);

newtype!(
    /// An index into the global index space.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct GlobalIdx(u32);
);

newtype!(
    /// An index into a function's local variables.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct LocalIdx(u32);
);

newtype!(
    /// An index referencing structured control instructions inside an
    /// instruction sequence.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct LabelIdx(u32);
);

/// Section identifier within a module.
///
/// `PartialOrd` is implemented so that, for non-custom section IDs, an ID is
/// less than another precisely when the former must appear in a module
/// before the latter when both are present.
#[derive(Clone, Copy, Debug, Eq, TryFromPrimitive, PartialEq)]
#[repr(u8)]
pub enum SectionId {
    /// Custom section with arbitrary data.
    Custom = 0,
    /// Function type declarations.
    Type = 1,
    /// Import declarations.
    Import = 2,
    /// Function type indices for module functions.
    Function = 3,
    /// Table declarations.
    Table = 4,
    /// Memory declarations.
    Memory = 5,
    /// Global declarations.
    Global = 6,
    /// Export declarations.
    Export = 7,
    /// Start function index.
    Start = 8,
    /// Element segments for table initialization.
    Element = 9,
    /// Function bodies.
    Code = 10,
    /// Data segments for memory initialization.
    Data = 11,
    /// Data segment count (for bulk memory operations).
    DataCount = 12,
}

impl SectionId {
    /// Whether sections with this ID can be decoded and encoded by this
    /// crate.
    pub const fn is_supported(self) -> bool {
        matches!(
            self,
            SectionId::Type | SectionId::Function | SectionId::Export | SectionId::Code
        )
    }
}

// The logical order, as documented above.
impl PartialOrd for SectionId {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        use SectionId::{Code, Data, DataCount};

        match (self, other) {
            // DataCount comes before Code and Data in the logical ordering.
            (DataCount, Code | Data) => Some(cmp::Ordering::Less),
            (Code | Data, DataCount) => Some(cmp::Ordering::Greater),
            _ => (*self as u8).partial_cmp(&(*other as u8)),
        }
    }
}

newtype!(
    /// Section containing function type declarations.
    #[derive(Clone, Debug)]
    pub struct TypeSection<A: Allocator>(Vec<FunctionType<A>, A>);
);

newtype!(
    /// Section containing type indices for module-defined functions, in
    /// positional correspondence with the code section.
    #[derive(Clone, Debug)]
    pub struct FunctionSection<A: Allocator>(Vec<TypeIdx, A>);
);

/// Describes what kind of entity is being exported.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExportDescriptor {
    /// Export a function with the given index.
    Function(FuncIdx),
    /// Export a table with the given index.
    Table(TableIdx),
    /// Export a memory with the given index.
    Memory(MemIdx),
    /// Export a global with the given index.
    Global(GlobalIdx),
}

/// The kind byte of an export descriptor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum ExportKind {
    Function = 0x00,
    Table = 0x01,
    Memory = 0x02,
    Global = 0x03,
}

impl ExportDescriptor {
    pub const fn kind(self) -> ExportKind {
        match self {
            ExportDescriptor::Function(_) => ExportKind::Function,
            ExportDescriptor::Table(_) => ExportKind::Table,
            ExportDescriptor::Memory(_) => ExportKind::Memory,
            ExportDescriptor::Global(_) => ExportKind::Global,
        }
    }

    /// The index of the exported entity within its index space.
    pub fn index(self) -> u32 {
        match self {
            ExportDescriptor::Function(idx) => *idx,
            ExportDescriptor::Table(idx) => *idx,
            ExportDescriptor::Memory(idx) => *idx,
            ExportDescriptor::Global(idx) => *idx,
        }
    }
}

/// An export declaration.
#[derive(Debug)]
pub struct Export<A: Allocator> {
    /// Name of the exported entity.
    pub field: Name<A>,
    /// Type and index of the exported entity.
    pub descriptor: ExportDescriptor,
}

newtype!(
    /// Section containing export declarations.
    #[derive(Debug)]
    pub struct ExportSection<A: Allocator>(Vec<Export<A>, A>);
);

/// A run of `count` local variables of the same type, as declared in a
/// function body. Runs are kept as declared rather than expanded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Locals {
    pub count: u32,
    pub ty: ValType,
}

/// A function body: its local declarations and its instructions.
#[derive(Clone, Debug)]
pub struct Function<A: Allocator> {
    /// Local variable declarations for this function.
    pub locals: Vec<Locals, A>,
    /// The function's instructions.
    pub body: Expression<A>,
}

newtype!(
    /// Section containing function bodies.
    #[derive(Clone, Debug)]
    pub struct CodeSection<A: Allocator>(Vec<Function<A>, A>);
);

/// A decoded section, in one of the supported kinds.
#[derive(Debug)]
pub enum Section<A: Allocator> {
    Type(TypeSection<A>),
    Function(FunctionSection<A>),
    Export(ExportSection<A>),
    Code(CodeSection<A>),
}

impl<A: Allocator> Section<A> {
    pub const fn id(&self) -> SectionId {
        match self {
            Section::Type(_) => SectionId::Type,
            Section::Function(_) => SectionId::Function,
            Section::Export(_) => SectionId::Export,
            Section::Code(_) => SectionId::Code,
        }
    }
}
