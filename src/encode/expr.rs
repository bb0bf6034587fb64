// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Encoding of instruction trees back into flat opcode streams.

use crate::Allocator;
use crate::types::{Expression, Instruction, Opcode};

use super::{Encodable, Encoder, Error};

// Writes the instructions followed by the closing `end`.
impl<B: Allocator> Encodable for Expression<B> {
    fn encode<A: Allocator>(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        encode_instructions(self, encoder)?;
        Opcode::End.encode(encoder)
    }
}

fn encode_instructions<A: Allocator, B: Allocator>(
    expr: &Expression<B>,
    encoder: &mut Encoder<A>,
) -> Result<(), Error> {
    expr.iter().try_for_each(|instr| instr.encode(encoder))
}

impl<B: Allocator> Encodable for Instruction<B> {
    fn encode<A: Allocator>(&self, encoder: &mut Encoder<A>) -> Result<(), Error> {
        self.opcode().encode(encoder)?;
        match self {
            Instruction::Block { ty, body } | Instruction::Loop { ty, body } => {
                ty.encode(encoder)?;
                body.encode(encoder)
            }
            // `else` is written exactly when there is an else arm.
            Instruction::If {
                ty,
                then,
                otherwise,
            } => {
                ty.encode(encoder)?;
                match otherwise {
                    Some(otherwise) => {
                        encode_instructions(then, encoder)?;
                        Opcode::Else.encode(encoder)?;
                        otherwise.encode(encoder)
                    }
                    None => then.encode(encoder),
                }
            }
            Instruction::Br(label) | Instruction::BrIf(label) => label.encode(encoder),
            Instruction::Call(func) => func.encode(encoder),
            Instruction::LocalGet(local) | Instruction::LocalSet(local) => local.encode(encoder),
            Instruction::I32Const(value) => encoder.write_i32(*value),
            Instruction::I32Eqz
            | Instruction::I32LtS
            | Instruction::I32GeS
            | Instruction::I32Add
            | Instruction::I32RemS => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_compat::alloc::Global;
    use crate::core_compat::vec::Vec;
    use crate::types::{BlockType, LabelIdx, ValType};

    fn expr(instrs: impl IntoIterator<Item = Instruction<Global>>) -> Expression<Global> {
        let mut vec = Vec::new_in(Global);
        vec.extend(instrs);
        Expression::new(vec)
    }

    fn encoded(expr: &Expression<Global>) -> std::vec::Vec<u8> {
        let mut encoder = Encoder::new(Global);
        expr.encode(&mut encoder).unwrap();
        encoder.as_bytes().to_vec()
    }

    #[test]
    fn empty_expression_is_just_end() {
        assert_eq!(encoded(&expr([])), [0x0b]);
    }

    #[test]
    fn immediates() {
        assert_eq!(
            encoded(&expr([
                Instruction::I32Const(-200),
                Instruction::I32Const(i32::MAX),
                Instruction::I32RemS,
            ])),
            [
                0x41, 0xb8, 0x7e, 0x41, 0xff, 0xff, 0xff, 0xff, 0x07, 0x6f, 0x0b
            ]
        );
    }

    #[test]
    fn if_else_placement() {
        let with_else = expr([Instruction::If {
            ty: BlockType::Result(ValType::I32),
            then: expr([Instruction::I32Const(1)]),
            otherwise: Some(expr([Instruction::I32Const(2)])),
        }]);
        assert_eq!(
            encoded(&with_else),
            [0x04, 0x7f, 0x41, 0x01, 0x05, 0x41, 0x02, 0x0b, 0x0b]
        );

        let without_else = expr([Instruction::If {
            ty: BlockType::Empty,
            then: expr([]),
            otherwise: None,
        }]);
        assert_eq!(encoded(&without_else), [0x04, 0x40, 0x0b, 0x0b]);

        let empty_else = expr([Instruction::If {
            ty: BlockType::Empty,
            then: expr([]),
            otherwise: Some(expr([])),
        }]);
        assert_eq!(encoded(&empty_else), [0x04, 0x40, 0x05, 0x0b, 0x0b]);
    }

    #[test]
    fn nested_blocks() {
        let nested = expr([Instruction::Block {
            ty: BlockType::Empty,
            body: expr([Instruction::Loop {
                ty: BlockType::Empty,
                body: expr([
                    Instruction::BrIf(LabelIdx::new(1)),
                    Instruction::Br(LabelIdx::new(0)),
                ]),
            }]),
        }]);
        assert_eq!(
            encoded(&nested),
            [
                0x02, 0x40, 0x03, 0x40, 0x0d, 0x01, 0x0c, 0x00, 0x0b, 0x0b, 0x0b
            ]
        );
    }
}
