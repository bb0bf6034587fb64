// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! WebAssembly instructions.
//!
//! Structured control instructions own their nested instruction sequences, so
//! a function body is a tree rather than a flat opcode stream. The `else` and
//! `end` opcodes delimit sequences and are implied by the tree's shape.

use num_enum::TryFromPrimitive;

use crate::Allocator;
use crate::core_compat::vec::Vec;

use super::{FuncIdx, LabelIdx, LocalIdx, TypeIdx, ValType};

// [wasm]: 5.4.1 Control Instructions
//
/// WebAssembly instruction opcode.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
pub enum Opcode {
    Block = 0x02,
    Loop = 0x03,
    If = 0x04,
    Else = 0x05,
    End = 0x0b,
    Br = 0x0c,
    BrIf = 0x0d,
    Call = 0x10,

    // [wasm]: 5.4.4 Variable Instructions
    LocalGet = 0x20,
    LocalSet = 0x21,

    // [wasm]: 5.4.7 Numeric Instructions
    I32Const = 0x41,
    I32Eqz = 0x45,
    I32LtS = 0x48,
    I32GeS = 0x4e,
    I32Add = 0x6a,
    I32RemS = 0x6f,
}

/// Block type for control instructions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlockType {
    /// Block produces no results.
    Empty,
    /// Block produces a single result of the given type.
    Result(ValType),
    /// Block type is defined by function signature at given type index.
    TypeIndex(TypeIdx),
}

impl BlockType {
    /// The single byte encoding the empty block type.
    pub const EMPTY: u8 = 0x40;
}

newtype!(
    /// A sequence of instructions. The terminating `end` (or `else`) is not
    /// part of the sequence.
    #[derive(Clone, Debug)]
    pub struct Expression<A: Allocator>(Vec<Instruction<A>, A>);
);

/// A single instruction, with nested sequences for structured control.
#[derive(Clone, Debug)]
pub enum Instruction<A: Allocator> {
    Block {
        ty: BlockType,
        body: Expression<A>,
    },
    Loop {
        ty: BlockType,
        body: Expression<A>,
    },
    /// `if` with an optional `else` arm. An absent `otherwise` encodes
    /// without an `else` opcode, while a present but empty one keeps it.
    If {
        ty: BlockType,
        then: Expression<A>,
        otherwise: Option<Expression<A>>,
    },
    Br(LabelIdx),
    BrIf(LabelIdx),
    Call(FuncIdx),
    LocalGet(LocalIdx),
    LocalSet(LocalIdx),
    I32Const(i32),
    I32Eqz,
    I32LtS,
    I32GeS,
    I32Add,
    I32RemS,
}

impl<A: Allocator> Instruction<A> {
    pub const fn opcode(&self) -> Opcode {
        match self {
            Instruction::Block { .. } => Opcode::Block,
            Instruction::Loop { .. } => Opcode::Loop,
            Instruction::If { .. } => Opcode::If,
            Instruction::Br(_) => Opcode::Br,
            Instruction::BrIf(_) => Opcode::BrIf,
            Instruction::Call(_) => Opcode::Call,
            Instruction::LocalGet(_) => Opcode::LocalGet,
            Instruction::LocalSet(_) => Opcode::LocalSet,
            Instruction::I32Const(_) => Opcode::I32Const,
            Instruction::I32Eqz => Opcode::I32Eqz,
            Instruction::I32LtS => Opcode::I32LtS,
            Instruction::I32GeS => Opcode::I32GeS,
            Instruction::I32Add => Opcode::I32Add,
            Instruction::I32RemS => Opcode::I32RemS,
        }
    }
}
