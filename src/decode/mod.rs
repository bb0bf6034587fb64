// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly binary format decoding.

mod decodable_impls;
mod expr;

use core::fmt;

use crate::core_compat::alloc::collections::TryReserveError;
use crate::core_compat::vec::Vec;
use crate::leb128::{self, Leb128};
use crate::storage::Stream;
use crate::types::{
    CodeSection, ExportSection, FunctionSection, Magic, Section, SectionId, TypeSection, Version,
};
use crate::{Allocator, Module};

/// The maximum number of context frames tracked while decoding.
///
/// Every level of structured-instruction nesting costs two frames, so this
/// bounds how deeply blocks may nest before decoding is abandoned.
pub const MAX_DEPTH: usize = 256;

// Represents decoding context.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
enum ContextId {
    #[default]
    Invalid,
    BlockType,
    CodeSec,
    Export,
    ExportDesc,
    ExportKind,
    ExportSec,
    Expr,
    Func,
    FuncIdx,
    FuncSec,
    FuncType,
    GlobalIdx,
    I32,
    Instr,
    LabelIdx,
    LocalIdx,
    Locals,
    Magic,
    MemIdx,
    Name,
    Opcode,
    ReadingBytes,
    ResultType,
    SectionId,
    TableIdx,
    TypeIdx,
    TypeSec,
    U32,
    ValType,
    VecCode,
    VecExport,
    VecFuncType,
    VecLocals,
    VecTypeIdx,
    VecValType,
    Version,
}

impl From<ContextId> for &'static str {
    fn from(id: ContextId) -> Self {
        match id {
            ContextId::Invalid => unreachable!("invalid context somehow reached!?"),
            ContextId::BlockType => "blocktype",
            ContextId::CodeSec => "codesec",
            ContextId::Export => "export",
            ContextId::ExportDesc => "exportdesc",
            ContextId::ExportKind => "exportdesc kind",
            ContextId::ExportSec => "exportsec",
            ContextId::Expr => "expr",
            ContextId::Func => "func",
            ContextId::FuncIdx => "funcidx",
            ContextId::FuncSec => "funcsec",
            ContextId::FuncType => "functype",
            ContextId::GlobalIdx => "globalidx",
            ContextId::I32 => "i32",
            ContextId::Instr => "instr",
            ContextId::LabelIdx => "labelidx",
            ContextId::LocalIdx => "localidx",
            ContextId::Locals => "locals",
            ContextId::Magic => "magic",
            ContextId::MemIdx => "memidx",
            ContextId::Name => "name",
            ContextId::Opcode => "opcode",
            ContextId::ReadingBytes => "reading bytes",
            ContextId::ResultType => "resulttype",
            ContextId::SectionId => "section ID",
            ContextId::TableIdx => "tableidx",
            ContextId::TypeIdx => "typeidx",
            ContextId::TypeSec => "typesec",
            ContextId::U32 => "u32",
            ContextId::ValType => "valtype",
            ContextId::VecCode => "vec(code)",
            ContextId::VecExport => "vec(export)",
            ContextId::VecFuncType => "vec(functype)",
            ContextId::VecLocals => "vec(locals)",
            ContextId::VecTypeIdx => "vec(typeidx)",
            ContextId::VecValType => "vec(valtype)",
            ContextId::Version => "version",
        }
    }
}

trait Contextual {
    const ID: ContextId;
}

// A frame of decoding context.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct ContextFrame {
    // A description of what is being decoded.
    context: &'static str,

    // Byte offset in the stream where this context was entered.
    offset: usize,
}

/// Stack for tracking decoding context during error reporting.
#[derive(Clone, Debug)]
pub(crate) struct ContextStack {
    offsets: [usize; MAX_DEPTH],
    ids: [ContextId; MAX_DEPTH],
    depth: u16,
}

impl Default for ContextStack {
    fn default() -> Self {
        Self {
            offsets: [0; MAX_DEPTH],
            ids: [ContextId::Invalid; MAX_DEPTH],
            depth: 0,
        }
    }
}

impl ContextStack {
    // Pushes a new context frame, returning true if successful.
    fn push(&mut self, id: ContextId, offset: usize) -> bool {
        let depth = self.depth as usize;
        if depth >= MAX_DEPTH {
            return false;
        }
        self.offsets[depth] = offset;
        self.ids[depth] = id;
        self.depth += 1;
        true
    }

    // Pop the top context frame.
    fn pop(&mut self) {
        debug_assert!(self.depth > 0, "{self:#?}");
        self.depth -= 1;
    }

    // Returns an iterator over frames in "pushed" order (outermost to
    // innermost).
    fn iter(&self) -> impl Iterator<Item = ContextFrame> + '_ {
        self.offsets
            .iter()
            .zip(&self.ids)
            .take(self.depth as usize)
            .map(|(&offset, &id)| ContextFrame {
                context: id.into(),
                offset,
            })
    }
}

/// A decoding error with additional context around what hierarchy of things
/// were being decoded at the time.
pub struct ErrorWithContext<Storage: Stream> {
    /// The underlying decoding error.
    pub error: Error<Storage>,
    pub(crate) context: ContextStack,
}

impl<Storage: Stream> ErrorWithContext<Storage> {
    /// The stream offset at which the innermost context was entered, if any
    /// context was entered at all.
    pub fn offset(&self) -> Option<usize> {
        self.context.iter().last().map(|frame| frame.offset)
    }
}

impl<Storage: Stream> fmt::Debug for ErrorWithContext<Storage> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.error)?;
        for (i, frame) in self.context.iter().enumerate() {
            write!(f, "\n{:#x}: ", frame.offset)?;
            for _ in 0..i {
                write!(f, "  ")?;
            }
            write!(f, "{}", frame.context)?;
        }
        Ok(())
    }
}

/// Represents errors that can arise during module decoding.
#[derive(Clone, Copy, Eq, PartialEq)]
pub enum Error<Storage: Stream> {
    /// Failed memory allocation.
    AllocError,
    /// A read would cross the end of the enclosing length-prefixed region.
    BufferUnderrun,
    /// A given section appears more than once in the module.
    DuplicateSection(SectionId),
    /// Decoder context stack exceeded maximum depth to prevent stack overflow.
    ExcessiveParsingDepth {
        context: &'static str,
        offset: usize,
    },
    /// A block type that is neither empty, a value type, nor a type index.
    InvalidBlockType(i64),
    /// A function type did not begin with the expected tag.
    InvalidFuncType(u8),
    /// Function body length doesn't match the declared length.
    InvalidFunctionLength { expected: u32, actual: u32 },
    /// Invalid LEB128 encoding encountered.
    InvalidLeb128,
    /// An unrecognized instruction opcode.
    InvalidOpcode(u8),
    /// A section ID outside of the defined range.
    InvalidSectionId(u8),
    /// Section length doesn't match the declared length.
    InvalidSectionLength {
        id: SectionId,
        expected: u32,
        actual: u32,
    },
    /// Invalid byte token encountered during decoding.
    InvalidToken(u8),
    /// Invalid UTF-8 encoding in a name field.
    InvalidUtf8,
    /// Invalid value type encoding encountered.
    InvalidValType(u8),
    /// (Non-custom) sections appear in the wrong order.
    OutOfOrderSection { before: SectionId, after: SectionId },
    /// Error from the underlying storage.
    Storage(Storage::Error),
    /// An `else` that does not close the then-branch of an `if`.
    UnexpectedElse,
    /// A defined section that this crate does not decode.
    UnsupportedSection(SectionId),
}

impl<Storage: Stream> fmt::Debug for Error<Storage> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AllocError => write!(f, "allocation failure"),
            Error::BufferUnderrun => write!(f, "read past the end of a length-prefixed region"),
            Error::DuplicateSection(id) => write!(f, "duplicate of section ({id:?})"),
            Error::ExcessiveParsingDepth { context, offset } => {
                write!(f, "unexpected frame at {offset:#x}: {context}")
            }
            Error::InvalidBlockType(value) => write!(f, "invalid blocktype ({value:#x})"),
            Error::InvalidFuncType(tag) => write!(f, "invalid functype tag ({tag:#x})"),
            Error::InvalidFunctionLength { expected, actual } => write!(
                f,
                "invalid func length: expected {expected:#x}; got {actual:#x}"
            ),
            Error::InvalidLeb128 => write!(f, "invalid LEB128-encoding"),
            Error::InvalidOpcode(op) => write!(f, "invalid opcode ({op:#x})"),
            Error::InvalidSectionId(id) => write!(f, "invalid section ID ({id:#x})"),
            Error::InvalidSectionLength {
                id,
                expected,
                actual,
            } => write!(
                f,
                "invalid section length for {id:?}: expected {expected:#x}; got {actual:#x}"
            ),
            Error::InvalidToken(token) => write!(f, "invalid byte token ({token:#x})"),
            Error::InvalidUtf8 => write!(f, "invalid UTF-8"),
            Error::InvalidValType(valtype) => write!(f, "invalid valtype ({valtype:#x})"),
            Error::OutOfOrderSection { before, after } => {
                write!(f, "out-of-order sections: {before:?} before {after:?}")
            }
            Error::Storage(err) => write!(f, "{err:?}"),
            Error::UnexpectedElse => write!(f, "else outside of an if"),
            Error::UnsupportedSection(id) => write!(f, "unsupported section ({id:?})"),
        }
    }
}

impl<Storage: Stream> leb128::Error for Error<Storage> {
    fn invalid_leb128() -> Self {
        Error::InvalidLeb128
    }
}

impl<Storage: Stream> From<TryReserveError> for Error<Storage> {
    fn from(_: TryReserveError) -> Self {
        Error::AllocError
    }
}

pub(crate) struct Decoder<Storage: Stream> {
    stream: Storage,

    // The stream offset that reads may not cross, if within a length-prefixed
    // region.
    fence: Option<usize>,
}

impl<Storage: Stream> Decoder<Storage> {
    fn new(stream: Storage) -> Self {
        Self {
            stream,
            fence: None,
        }
    }

    // Pushes a context frame before a call, popping it if successful.
    fn with_context<F, R>(
        &mut self,
        context: &mut ContextStack,
        id: ContextId,
        f: F,
    ) -> Result<R, Error<Storage>>
    where
        F: FnOnce(&mut Self, &mut ContextStack) -> Result<R, Error<Storage>>,
    {
        let offset = self.stream.offset();
        if !context.push(id, offset) {
            return Err(Error::ExcessiveParsingDepth {
                context: id.into(),
                offset,
            });
        }
        let val = f(self, context)?;
        context.pop();
        Ok(val)
    }

    // Runs `f` with reads limited to the next `len` bytes, returning its result
    // along with the number of bytes actually consumed.
    fn fenced<F, R>(
        &mut self,
        context: &mut ContextStack,
        len: u32,
        f: F,
    ) -> Result<(R, u32), Error<Storage>>
    where
        F: FnOnce(&mut Self, &mut ContextStack) -> Result<R, Error<Storage>>,
    {
        let start = self.offset();
        let end = start
            .checked_add(len as usize)
            .ok_or(Error::BufferUnderrun)?;
        if self.fence.is_some_and(|outer| end > outer) {
            return Err(Error::BufferUnderrun);
        }
        let outer = self.fence.replace(end);
        let val = f(self, context)?;
        self.fence = outer;
        Ok((val, (self.offset() - start) as u32))
    }

    fn offset(&mut self) -> usize {
        self.stream.offset()
    }

    // The number of bytes left before the current fence, if any.
    fn remaining(&mut self) -> Option<usize> {
        let offset = self.offset();
        self.fence.map(|fence| fence.saturating_sub(offset))
    }

    fn check_fence(&mut self, count: usize) -> Result<(), Error<Storage>> {
        match self.remaining() {
            Some(remaining) if count > remaining => Err(Error::BufferUnderrun),
            _ => Ok(()),
        }
    }

    fn read_byte_raw(&mut self) -> Result<u8, Error<Storage>> {
        self.check_fence(1)?;
        self.stream.read_byte().map_err(Error::Storage)
    }

    fn read_leb128_raw<T: Leb128>(&mut self) -> Result<T, Error<Storage>> {
        leb128::read(|| self.read_byte_raw())
    }

    fn read_s33_raw(&mut self) -> Result<i64, Error<Storage>> {
        leb128::read_s33(|| self.read_byte_raw())
    }

    fn read_exact_raw(&mut self, buf: &mut [u8]) -> Result<(), Error<Storage>> {
        self.check_fence(buf.len())?;
        self.stream.read_exact(buf).map_err(Error::Storage)
    }

    fn read_exact(
        &mut self,
        context: &mut ContextStack,
        buf: &mut [u8],
    ) -> Result<(), Error<Storage>> {
        self.with_context(context, ContextId::ReadingBytes, |decoder, _| {
            decoder.read_exact_raw(buf)
        })
    }

    fn read<A: Allocator, T: Decodable<A> + Contextual>(
        &mut self,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<T, Error<Storage>> {
        self.with_context(context, T::ID, |decoder, context| {
            T::decode(decoder, context, alloc)
        })
    }

    fn read_bounded<T: BoundedDecodable + Contextual>(
        &mut self,
        context: &mut ContextStack,
    ) -> Result<T, Error<Storage>> {
        self.with_context(context, T::ID, |decoder, context| {
            T::decode(decoder, context)
        })
    }
}

// Types that can be decoded from a storage stream, possibly with allocation.
trait Decodable<A>: Sized
where
    A: Allocator,
{
    /// Decode this type from the binary stream.
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        alloc: &A,
    ) -> Result<Self, Error<Storage>>;
}

// Types that can be decoded from a storage stream without allocation.
trait BoundedDecodable: Sized + Copy {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
    ) -> Result<Self, Error<Storage>>;
}

impl<Bounded: BoundedDecodable, A: Allocator> Decodable<A> for Bounded {
    fn decode<Storage: Stream>(
        decoder: &mut Decoder<Storage>,
        context: &mut ContextStack,
        _: &A,
    ) -> Result<Self, Error<Storage>> {
        <Self as BoundedDecodable>::decode(decoder, context)
    }
}

// Decode a WebAssembly module from a storage stream.
//
// # Arguments
// * `storage` - Data stream containing WASM binary
// * `context` - Context stack for error reporting
// * `alloc` - Allocator for decoded data
pub(crate) fn decode_module<Storage, A>(
    storage: Storage,
    context: &mut ContextStack,
    alloc: A,
) -> Result<Module<A>, Error<Storage>>
where
    Storage: Stream,
    A: Allocator,
{
    let mut decoder = Decoder::new(storage);
    let magic: Magic = decoder.read_bounded(context)?;
    let version: Version = decoder.read_bounded(context)?;
    log::trace!("module header: magic {:x?}, version {:x?}", *magic, *version);

    let mut sections = Vec::new_in(alloc.clone());

    // The last section ID seen.
    let mut last_id = None;
    loop {
        // There is no in-band signal in the WASM format for the end of a
        // module. The best we can generically do is expect an EOF at a section
        // boundary.
        let id = decoder.read_bounded(context);
        if let Err(Error::Storage(ref err)) = id
            && Storage::is_eof(err)
        {
            break;
        }
        let id: SectionId = id?;
        if !id.is_supported() {
            return Err(Error::UnsupportedSection(id));
        }

        // Sections must appear at most once and in order.
        if let Some(last_id) = last_id {
            if id == last_id {
                return Err(Error::DuplicateSection(id));
            }
            if id < last_id {
                return Err(Error::OutOfOrderSection {
                    before: last_id,
                    after: id,
                });
            }
        }
        last_id = Some(id);

        let len: u32 = decoder.read_bounded(context)?;
        let offset = decoder.offset();
        let (section, actual) = decoder.fenced(context, len, |decoder, context| {
            Ok(match id {
                SectionId::Type => {
                    Section::Type(decoder.read::<A, TypeSection<A>>(context, &alloc)?)
                }
                SectionId::Function => {
                    Section::Function(decoder.read::<A, FunctionSection<A>>(context, &alloc)?)
                }
                SectionId::Export => {
                    Section::Export(decoder.read::<A, ExportSection<A>>(context, &alloc)?)
                }
                SectionId::Code => {
                    Section::Code(decoder.read::<A, CodeSection<A>>(context, &alloc)?)
                }
                _ => return Err(Error::UnsupportedSection(id)),
            })
        })?;
        if actual != len {
            return Err(Error::InvalidSectionLength {
                id,
                expected: len,
                actual,
            });
        }
        log::debug!("decoded {id:?} section: {len:#x} bytes at offset {offset:#x}");

        sections.try_reserve(1)?;
        sections.push(section);
    }

    Ok(Module {
        magic,
        version,
        sections,
    })
}
