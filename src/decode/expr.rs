// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Decoding of instruction sequences into trees of structured instructions.

use crate::Allocator;
use crate::core_compat::vec::Vec;
use crate::storage::Stream;
use crate::types::{Expression, Instruction, Opcode};

use super::{ContextId, ContextStack, Decoder, Error};

// The opcode that ended an instruction sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Terminator {
    End,
    Else,
}

// Decodes instructions up to and including the next unnested `end` or `else`,
// which is consumed and reported but not stored. Callers decide whether the
// terminator is valid where the sequence appears.
pub(super) fn decode_expression<A: Allocator, Storage: Stream>(
    decoder: &mut Decoder<Storage>,
    context: &mut ContextStack,
    alloc: &A,
) -> Result<(Expression<A>, Terminator), Error<Storage>> {
    let mut instrs = Vec::new_in(alloc.clone());
    loop {
        let op: Opcode = decoder.read_bounded(context)?;
        let instr = match op {
            Opcode::End => return Ok((Expression::new(instrs), Terminator::End)),
            Opcode::Else => return Ok((Expression::new(instrs), Terminator::Else)),
            Opcode::Block | Opcode::Loop | Opcode::If => {
                decoder.with_context(context, ContextId::Instr, |decoder, context| {
                    decode_structured(decoder, context, op, alloc)
                })?
            }
            Opcode::Br => Instruction::Br(decoder.read_bounded(context)?),
            Opcode::BrIf => Instruction::BrIf(decoder.read_bounded(context)?),
            Opcode::Call => Instruction::Call(decoder.read_bounded(context)?),
            Opcode::LocalGet => Instruction::LocalGet(decoder.read_bounded(context)?),
            Opcode::LocalSet => Instruction::LocalSet(decoder.read_bounded(context)?),
            Opcode::I32Const => Instruction::I32Const(decoder.read_bounded(context)?),
            Opcode::I32Eqz => Instruction::I32Eqz,
            Opcode::I32LtS => Instruction::I32LtS,
            Opcode::I32GeS => Instruction::I32GeS,
            Opcode::I32Add => Instruction::I32Add,
            Opcode::I32RemS => Instruction::I32RemS,
        };
        instrs.try_reserve(1)?;
        instrs.push(instr);
    }
}

// Decodes the block type and nested sequences of a block, loop, or if.
fn decode_structured<A: Allocator, Storage: Stream>(
    decoder: &mut Decoder<Storage>,
    context: &mut ContextStack,
    op: Opcode,
    alloc: &A,
) -> Result<Instruction<A>, Error<Storage>> {
    let ty = decoder.read_bounded(context)?;
    match op {
        Opcode::Block => Ok(Instruction::Block {
            ty,
            body: decoder.read(context, alloc)?,
        }),
        Opcode::Loop => Ok(Instruction::Loop {
            ty,
            body: decoder.read(context, alloc)?,
        }),
        Opcode::If => {
            let (then, terminator) =
                decoder.with_context(context, ContextId::Expr, |decoder, context| {
                    decode_expression(decoder, context, alloc)
                })?;
            let otherwise = match terminator {
                Terminator::End => None,
                Terminator::Else => Some(decoder.read(context, alloc)?),
            };
            Ok(Instruction::If {
                ty,
                then,
                otherwise,
            })
        }
        _ => unreachable!("not a structured instruction: {op:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_compat::alloc::Global;
    use crate::decode::MAX_DEPTH;
    use crate::storage::Buffer;
    use crate::types::{BlockType, ValType};

    type TestError = Error<Buffer<std::vec::Vec<u8>>>;

    fn decode(bytes: &[u8]) -> Result<(Expression<Global>, Terminator), TestError> {
        let mut decoder = Decoder::new(Buffer::new(bytes.to_vec()));
        decode_expression(&mut decoder, &mut ContextStack::default(), &Global)
    }

    fn decode_body(bytes: &[u8]) -> Result<Expression<Global>, TestError> {
        let mut decoder = Decoder::new(Buffer::new(bytes.to_vec()));
        decoder.read(&mut ContextStack::default(), &Global)
    }

    #[test]
    fn flat_sequence() {
        // i32.const 42; end
        let (expr, terminator) = decode(&[0x41, 0x2a, 0x0b]).unwrap();
        assert_eq!(terminator, Terminator::End);
        assert_eq!(expr.len(), 1);
        assert!(matches!(expr[0], Instruction::I32Const(42)));

        // An empty sequence.
        let (expr, terminator) = decode(&[0x05]).unwrap();
        assert_eq!(terminator, Terminator::Else);
        assert!(expr.is_empty());
    }

    #[test]
    fn negative_immediates() {
        // i32.const -200; end
        let (expr, _) = decode(&[0x41, 0xb8, 0x7e, 0x0b]).unwrap();
        assert!(matches!(expr[0], Instruction::I32Const(-200)));
    }

    #[test]
    fn if_else() {
        // local.get 0; if (result i32) i32.const 1 else i32.const 2 end; end
        let body = decode_body(&[
            0x20, 0x00, 0x04, 0x7f, 0x41, 0x01, 0x05, 0x41, 0x02, 0x0b, 0x0b,
        ])
        .unwrap();
        assert_eq!(body.len(), 2);
        let Instruction::If {
            ty,
            then,
            otherwise: Some(otherwise),
        } = &body[1]
        else {
            panic!("expected if/else: {:?}", body[1]);
        };
        assert_eq!(*ty, BlockType::Result(ValType::I32));
        assert!(matches!(then[..], [Instruction::I32Const(1)]));
        assert!(matches!(otherwise[..], [Instruction::I32Const(2)]));
    }

    #[test]
    fn if_without_else() {
        // if end; end
        let body = decode_body(&[0x04, 0x40, 0x0b, 0x0b]).unwrap();
        assert!(matches!(
            body[..],
            [Instruction::If {
                ty: BlockType::Empty,
                otherwise: None,
                ..
            }]
        ));

        // An explicit but empty else arm is kept distinct from none at all.
        let body = decode_body(&[0x04, 0x40, 0x05, 0x0b, 0x0b]).unwrap();
        let Instruction::If {
            otherwise: Some(otherwise),
            ..
        } = &body[0]
        else {
            panic!("expected if/else: {:?}", body[0]);
        };
        assert!(otherwise.is_empty());
    }

    #[test]
    fn nested_blocks() {
        // block; loop; br_if 1; br 0; end; end; end
        let body = decode_body(&[
            0x02, 0x40, 0x03, 0x40, 0x0d, 0x01, 0x0c, 0x00, 0x0b, 0x0b, 0x0b,
        ])
        .unwrap();
        let [Instruction::Block { body: block, .. }] = &body[..] else {
            panic!("expected a block: {body:?}");
        };
        let [Instruction::Loop { body: inner, .. }] = &block[..] else {
            panic!("expected a loop: {block:?}");
        };
        assert!(matches!(
            inner[..],
            [Instruction::BrIf(outer), Instruction::Br(this)] if *outer == 1 && *this == 0
        ));
    }

    #[test]
    fn else_outside_of_if() {
        assert!(matches!(decode_body(&[0x05]), Err(Error::UnexpectedElse)));
        // block; else
        assert!(matches!(
            decode_body(&[0x02, 0x40, 0x05, 0x0b]),
            Err(Error::UnexpectedElse)
        ));
        // if; else; else
        assert!(matches!(
            decode_body(&[0x04, 0x40, 0x05, 0x05, 0x0b]),
            Err(Error::UnexpectedElse)
        ));
    }

    #[test]
    fn invalid_opcodes() {
        // i32.sub
        assert!(matches!(
            decode_body(&[0x41, 0x01, 0x6b, 0x0b]),
            Err(Error::InvalidOpcode(0x6b))
        ));
        // nop
        assert!(matches!(decode_body(&[0x01]), Err(Error::InvalidOpcode(0x01))));
    }

    #[test]
    fn nesting_is_bounded() {
        fn nested(levels: usize) -> std::vec::Vec<u8> {
            let mut bytes = std::vec::Vec::new();
            for _ in 0..levels {
                bytes.extend_from_slice(&[0x02, 0x40]);
            }
            bytes.resize(bytes.len() + levels + 1, 0x0b);
            bytes
        }

        let body = decode_body(&nested(10)).unwrap();
        assert_eq!(body.len(), 1);

        assert!(matches!(
            decode_body(&nested(MAX_DEPTH)),
            Err(Error::ExcessiveParsingDepth { .. })
        ));
    }
}
