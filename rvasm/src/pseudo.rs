//! Pseudo-instruction expansion: a small, fixed table of mnemonics the
//! Parser rewrites into one or more real instructions before they ever
//! reach the instruction arena. Expansion happens inline during parsing,
//! so every expanded instruction gets its own `offset_in_text` and
//! participates in relocation exactly like a hand-written one.

use crate::error::{Result, SyntaxError};
use crate::lexer::SourceLoc;
use crate::parser::{ImmSource, Parser, RegisterRoles};

pub fn is_pseudo_mnemonic(name: &str) -> bool {
    matches!(
        name,
        "nop" | "li" | "mv" | "not" | "neg" | "seqz" | "snez" | "j" | "jr" | "ret" | "call" | "la" | "sext.w" | "beqz" | "bnez"
    )
}

/// Expands `mnemonic` by reading its own operands off `parser` (pseudo-ops
/// have their own surface grammars, distinct from any real opcode's) and
/// emitting the equivalent real instructions via
/// [`Parser::build_and_emit`].
pub(crate) fn expand(parser: &mut Parser, mnemonic: &str, anchor_label: Option<String>, loc: SourceLoc) -> Result<()> {
    match mnemonic {
        "nop" => emit_rri(parser, "addi", 0, 0, ImmSource::Literal(0), anchor_label, loc),
        "ret" => emit_jalr(parser, 0, 1, 0, anchor_label, loc),
        "jr" => {
            let rs = parser.reg()?;
            emit_jalr(parser, 0, rs, 0, anchor_label, loc)
        }
        "j" => {
            let target = parser.operand_value()?;
            let regs = RegisterRoles { rd: Some(0), ..Default::default() };
            parser.build_and_emit("jal", regs, Some(target), None, None, anchor_label, loc)?;
            Ok(())
        }
        "beqz" | "bnez" => {
            let rs = parser.reg()?;
            parser.comma_pub()?;
            let target = parser.operand_value()?;
            let real = if mnemonic == "beqz" { "beq" } else { "bne" };
            let regs = RegisterRoles { rs1: Some(rs), rs2: Some(0), ..Default::default() };
            parser.build_and_emit(real, regs, Some(target), None, None, anchor_label, loc)?;
            Ok(())
        }
        "mv" => {
            let rd = parser.reg()?;
            parser.comma_pub()?;
            let rs = parser.reg()?;
            emit_rri(parser, "addi", rd, rs, ImmSource::Literal(0), anchor_label, loc)
        }
        "not" => {
            let rd = parser.reg()?;
            parser.comma_pub()?;
            let rs = parser.reg()?;
            emit_rri(parser, "xori", rd, rs, ImmSource::Literal(-1), anchor_label, loc)
        }
        "sext.w" => {
            let rd = parser.reg()?;
            parser.comma_pub()?;
            let rs = parser.reg()?;
            emit_rri(parser, "addiw", rd, rs, ImmSource::Literal(0), anchor_label, loc)
        }
        "seqz" => {
            let rd = parser.reg()?;
            parser.comma_pub()?;
            let rs = parser.reg()?;
            emit_rri(parser, "sltiu", rd, rs, ImmSource::Literal(1), anchor_label, loc)
        }
        "neg" => {
            let rd = parser.reg()?;
            parser.comma_pub()?;
            let rs = parser.reg()?;
            let regs = RegisterRoles { rd: Some(rd), rs1: Some(0), rs2: Some(rs), ..Default::default() };
            parser.build_and_emit("sub", regs, None, None, None, anchor_label, loc)?;
            Ok(())
        }
        "snez" => {
            let rd = parser.reg()?;
            parser.comma_pub()?;
            let rs = parser.reg()?;
            let regs = RegisterRoles { rd: Some(rd), rs1: Some(0), rs2: Some(rs), ..Default::default() };
            parser.build_and_emit("sltu", regs, None, None, None, anchor_label, loc)?;
            Ok(())
        }
        "li" => {
            let rd = parser.reg()?;
            parser.comma_pub()?;
            match parser.operand_value()? {
                ImmSource::Literal(v) if (-2048..2048).contains(&v) => {
                    emit_rri(parser, "addi", rd, 0, ImmSource::Literal(v), anchor_label, loc)
                }
                ImmSource::Literal(v) => {
                    let hi = v.wrapping_add(0x800) & !0xfff;
                    let lo = v.wrapping_sub(hi);
                    let regs_hi = RegisterRoles { rd: Some(rd), ..Default::default() };
                    parser.build_and_emit("lui", regs_hi, Some(ImmSource::Literal(hi)), None, None, anchor_label, loc)?;
                    emit_rri(parser, "addi", rd, rd, ImmSource::Literal(lo), None, loc)
                }
                ImmSource::Symbol { modifier: None, name, addend } => {
                    let regs_hi = RegisterRoles { rd: Some(rd), ..Default::default() };
                    parser.build_and_emit(
                        "lui",
                        regs_hi,
                        Some(ImmSource::Symbol { modifier: Some(mc::operand::Modifier::Hi), name: name.clone(), addend }),
                        None,
                        None,
                        anchor_label,
                        loc,
                    )?;
                    emit_rri(
                        parser,
                        "addi",
                        rd,
                        rd,
                        ImmSource::Symbol { modifier: Some(mc::operand::Modifier::Lo), name, addend },
                        None,
                        loc,
                    )
                }
                other => {
                    let regs_hi = RegisterRoles { rd: Some(rd), ..Default::default() };
                    parser.build_and_emit("lui", regs_hi, Some(other), None, None, anchor_label, loc)?;
                    Ok(())
                }
            }
        }
        "la" | "call" => {
            let (rd, name_operand) = if mnemonic == "la" {
                let rd = parser.reg()?;
                parser.comma_pub()?;
                (rd, parser.operand_value()?)
            } else {
                (1u8, parser.operand_value()?)
            };
            let symbol = match &name_operand {
                ImmSource::Symbol { name, .. } => name.clone(),
                _ => return Err(SyntaxError::MissingOperand { loc, mnemonic: mnemonic.to_string() }.into()),
            };
            let regs_hi = RegisterRoles { rd: Some(rd), ..Default::default() };
            parser.build_and_emit(
                "auipc",
                regs_hi,
                Some(ImmSource::Symbol { modifier: Some(mc::operand::Modifier::PcrelHi), name: symbol.clone(), addend: 0 }),
                None,
                None,
                anchor_label,
                loc,
            )?;
            // %pcrel_lo addresses the auipc by a label on it, not the
            // real target; pseudo-expanded pairs don't have a source-level
            // label to anchor on, so synthesize one unique to this site.
            let anchor = format!(".Lpcrel_hi{}", parser.next_anchor_id());
            parser.tracker_mut().pcrel_anchors.insert(
                anchor.clone(),
                crate::symbols::PcrelAnchor { symbol, addend: 0, hi_inst_index: parser.last_inst_index() },
            );
            // `la` only needs the address (addi); `call` needs to actually
            // transfer control there (jalr).
            let tail = if mnemonic == "la" { "addi" } else { "jalr" };
            emit_rri(
                parser,
                tail,
                rd,
                rd,
                ImmSource::Symbol { modifier: Some(mc::operand::Modifier::PcrelLo), name: anchor, addend: 0 },
                None,
                loc,
            )
        }
        _ => unreachable!("is_pseudo_mnemonic admitted an unhandled mnemonic: {}", mnemonic),
    }
}

fn emit_rri(
    parser: &mut Parser,
    real: &str,
    rd: u8,
    rs1: u8,
    imm: ImmSource,
    anchor_label: Option<String>,
    loc: SourceLoc,
) -> Result<()> {
    let regs = RegisterRoles { rd: Some(rd), rs1: Some(rs1), ..Default::default() };
    parser.build_and_emit(real, regs, Some(imm), None, None, anchor_label, loc)?;
    Ok(())
}

fn emit_jalr(parser: &mut Parser, rd: u8, rs1: u8, offset: i64, anchor_label: Option<String>, loc: SourceLoc) -> Result<()> {
    let regs = RegisterRoles { rd: Some(rd), rs1: Some(rs1), ..Default::default() };
    parser.build_and_emit("jalr", regs, Some(ImmSource::Literal(offset)), None, None, anchor_label, loc)?;
    Ok(())
}
