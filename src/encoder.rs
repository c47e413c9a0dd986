//! Stitches a resolved [`Instruction`] down into its encoded word.
//!
//! By the time an instruction reaches this module every symbolic operand
//! has already been rewritten to a plain immediate by the relocator
//! upstream (in `rvasm`); the encoder only ever sees `Register` and
//! immediate-family operands, never `Expr`.

use crate::error::{EncodingError, Result};
use crate::instruction::Instruction;
use crate::opcode::EncodingField;
use crate::operand::Operand;

/// Concatenates an immediate's declared bit ranges (MSB-most range first,
/// as written) into a single right-aligned value. `value` is the signed
/// immediate reinterpreted as its two's-complement bit pattern; extracting
/// arbitrary bit positions out of that pattern is well defined regardless
/// of the range's position, as long as `value` was already range-checked
/// upstream.
///
/// For a field with a single range whose low bit is nonzero (only U-type
/// `imm[31:12]` fields: lui/auipc), this means the value must already be
/// shifted into its formal position (`%hi(sym)`'s natural output, or a
/// literal `lui rd, N` written as `N << 12`) before it reaches the
/// encoder. Every other field's low bit is 0, so extraction and "take the
/// low bits" coincide and no such shift is needed.
fn stitch(value: u64, ranges: &[(u32, u32)]) -> u64 {
    let mut acc: u64 = 0;
    for &(hi, lo) in ranges {
        let width = hi - lo + 1;
        let mask = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
        let chunk = (value >> lo) & mask;
        acc = (acc << width) | chunk;
    }
    acc
}

fn mask(width: u32) -> u64 {
    if width == 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Encodes one instruction to its 16- or 32-bit machine word.
///
/// Walks the opcode template's fields (stored LSB -> MSB, see
/// [`crate::opcode`]'s module docs) accumulating into `(bits, len)`:
/// each field's value is shifted up to the current bit offset and OR'd in,
/// then `len` advances by the field's width. Register-family fields pull
/// from the instruction's register operands in order; every other
/// field (immediate, Rm, pred/succ) pulls from the remaining
/// non-register operands in order.
pub fn encode(inst: &Instruction) -> Result<u32> {
    let reg_operands: Vec<&Operand> = inst
        .operands
        .iter()
        .filter(|op| matches!(op, Operand::Register(_)))
        .collect();
    let extra_operands: Vec<&Operand> = inst
        .operands
        .iter()
        .filter(|op| !matches!(op, Operand::Register(_)))
        .collect();

    let mut reg_idx = 0usize;
    let mut fence_idx = 0usize;
    let mut bits: u64 = 0;
    let mut len: u32 = 0;

    for field in &inst.opcode.fields {
        let (value, width) = match field {
            EncodingField::Static { bits: v, width } => (*v as u64, *width),
            EncodingField::Rd | EncodingField::Rs1 | EncodingField::Rs2 | EncodingField::Rs3 => {
                let reg = reg_operands[reg_idx].as_reg();
                reg_idx += 1;
                (reg as u64, 5)
            }
            EncodingField::RdC | EncodingField::Rs1C | EncodingField::Rs2C | EncodingField::Rs3C => {
                let reg = reg_operands[reg_idx].as_reg();
                reg_idx += 1;
                let compressed = crate::register::Register(reg).compressed().ok_or(EncodingError::CompressedRegisterOutOfRange {
                    mnemonic: inst.opcode.name,
                    loc: inst.loc,
                    reg,
                })?;
                (compressed as u64, 3)
            }
            // An opcode's Imm/Uimm/NzImm/Offset fields always describe a
            // single logical immediate, even when split across multiple
            // bit ranges declared as separate template tokens (S-type and
            // B-type write their immediate as two `offset[...]` tokens).
            // There is always exactly one such operand; it never advances.
            EncodingField::Imm(ranges)
            | EncodingField::Uimm(ranges)
            | EncodingField::NzImm(ranges)
            | EncodingField::Offset(ranges) => {
                let raw = extra_operands[0].as_gimm();
                let width = field.width();
                (stitch(raw, ranges), width)
            }
            EncodingField::Rm => {
                let raw = extra_operands[0].as_gimm();
                (raw & mask(3), 3)
            }
            // FENCE's pred/succ are two genuinely distinct operand values,
            // unlike the immediate families above.
            EncodingField::MemFence => {
                let raw = extra_operands[fence_idx].as_gimm();
                fence_idx += 1;
                (raw & mask(4), 4)
            }
        };
        bits |= (value & mask(width)) << len;
        len += width;
    }

    if len != 16 && len != 32 {
        return Err(EncodingError::BitWidthMismatch {
            mnemonic: inst.opcode.name,
            got_bits: len,
        });
    }

    Ok(bits as u32)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::instruction::{Instruction, SourceLoc};
    use crate::opcode::OPCODES;
    use crate::operand::Operand;

    #[test]
    fn addi_x1_x0_5() {
        let addi = OPCODES.lookup("addi").unwrap();
        let inst = Instruction::new(
            addi,
            SourceLoc::default(),
            vec![Operand::make_reg(1), Operand::make_reg(0), Operand::make_imm(5)],
        );
        assert_eq!(encode(&inst).unwrap(), 0x00500093);
    }

    #[test]
    fn lui_x1_0x12345() {
        // U-type immediates are stored pre-shifted into their formal 32-bit
        // position (bits 31:12 carry the 20-bit value): the encoder extracts
        // value bits 31:12 literally, matching the ISA manual's imm[31:12]
        // definition. Shifting a bare `lui rd, 0x12345` write into this form
        // is the parser's job, not the encoder's.
        let lui = OPCODES.lookup("lui").unwrap();
        let inst = Instruction::new(
            lui,
            SourceLoc::default(),
            vec![Operand::make_reg(5), Operand::make_imm(0x12345 << 12)],
        );
        assert_eq!(encode(&inst).unwrap(), 0x123452b7);
    }

    #[test]
    fn jal_forward_branch_offset_is_split_and_reassembled() {
        let jal = OPCODES.lookup("jal").unwrap();
        // jal ra, +16: offset = 16 = 0b1_0000
        let inst = Instruction::new(jal, SourceLoc::default(), vec![Operand::make_reg(1), Operand::make_imm(16)]);
        let word = encode(&inst).unwrap();
        assert_eq!(word & 0x7f, 0b1101111);
        assert_eq!((word >> 7) & 0x1f, 1); // rd = ra
    }

    #[test]
    fn sw_s_type_splits_offset_across_two_ranges() {
        let sw = OPCODES.lookup("sw").unwrap();
        // sw x2, -4(x8): offset = -4
        let inst = Instruction::new(sw, SourceLoc::default(), vec![Operand::make_reg(2), Operand::make_reg(8), Operand::make_imm(-4)]);
        let word = encode(&inst).unwrap();
        assert_eq!(word & 0x7f, 0b0100011);
        let lo5 = (word >> 7) & 0x1f;
        let hi7 = (word >> 25) & 0x7f;
        let reassembled = ((hi7 << 5) | lo5) as i32;
        let sext = (reassembled << 20) >> 20;
        assert_eq!(sext, -4);
    }

    #[test]
    fn compressed_register_out_of_range_is_an_error_not_a_panic() {
        let c_and = OPCODES.lookup("c.and").unwrap();
        let inst = Instruction::new(c_and, SourceLoc::default(), vec![Operand::make_reg(16), Operand::make_reg(9)]);
        match encode(&inst) {
            Err(EncodingError::CompressedRegisterOutOfRange { reg, .. }) => assert_eq!(reg, 16),
            other => panic!("expected CompressedRegisterOutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn fence_packs_pred_and_succ_nibbles() {
        let fence = OPCODES.lookup("fence").unwrap();
        let inst = Instruction::new(fence, SourceLoc::default(), vec![Operand::make_imm(0b1111), Operand::make_imm(0b0011)]);
        let word = encode(&inst).unwrap();
        assert_eq!(word & 0x7f, 0b0001111);
        assert_eq!((word >> 20) & 0xf, 0b1111);
        assert_eq!((word >> 24) & 0xf, 0b0011);
    }
}
