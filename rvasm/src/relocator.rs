//! Settles every symbolic operand the parser deferred, now that every
//! label's address is fixed.
//!
//! Every pending relocation is tried directly against `.text` first,
//! regardless of its modifier: if the symbol is already defined there, the
//! relevant value (a branch/jump delta, or the matching half of a hi/lo
//! split) is placement-independent and can just be computed and baked in
//! now. Only a symbol with no local `.text` definition (extern, or defined
//! in `.data`/`.bss`) falls back to emitting a relocation, since its final
//! value isn't fixed until link time. `%pcrel_hi`/`%pcrel_lo` additionally
//! need their anchor-label indirection resolved first (see
//! [`resolve_pcrel_hi`]/[`resolve_pcrel_lo`]) before the same direct-first
//! lookup applies.
use elfobj::{constants, GlobalSymbol, Relocation};
use mc::instruction::Instruction;
use mc::opcode::ImmediateShape;
use mc::operand::{Modifier, Operand};

use crate::error::{Result, SemanticError};
use crate::parser::ParsedProgram;
use crate::symbols::PendingRelocation;

pub struct ResolvedProgram {
    pub instructions: Vec<Instruction>,
    pub data: Vec<u8>,
    pub bss_size: u64,
    pub globals: Vec<GlobalSymbol>,
    pub text_labels: Vec<String>,
    pub relocations: Vec<Relocation>,
}

pub fn resolve(mut program: ParsedProgram) -> Result<ResolvedProgram> {
    let pending = program.tracker.pending.clone();
    let mut relocations = Vec::new();
    for p in &pending {
        resolve_one(&mut program, p, &mut relocations)?;
    }
    let globals = program.tracker.finalize_globals();
    let text_labels = program.tracker.text_labels.keys().cloned().collect();
    Ok(ResolvedProgram {
        instructions: program.instructions,
        data: program.data,
        bss_size: program.bss_size,
        globals,
        text_labels,
        relocations,
    })
}

fn find_operand_index(inst: &Instruction) -> usize {
    inst.operands
        .iter()
        .position(|op| matches!(op, Operand::Imm(_) | Operand::Expr(_)))
        .expect("a pending relocation's instruction carries no immediate-family operand")
}

fn resolve_one(program: &mut ParsedProgram, p: &PendingRelocation, relocations: &mut Vec<Relocation>) -> Result<()> {
    let op_idx = find_operand_index(&program.instructions[p.inst_index]);
    let is_expr = program.instructions[p.inst_index].operands[op_idx].is_expr();
    if is_expr {
        let expr = program.instructions[p.inst_index].operands[op_idx].as_expr().clone();
        match expr.kind {
            Modifier::PcrelHi => resolve_pcrel_hi(program, p, op_idx, &expr.symbol, expr.addend, relocations),
            Modifier::PcrelLo => resolve_pcrel_lo(program, p, op_idx, relocations),
            _ => resolve_absolute(program, p, op_idx, expr.kind, &expr.symbol, expr.addend, relocations),
        }
    } else {
        resolve_plain_target(program, p, op_idx, relocations)
    }
}

/// Bare branch/jump label (`beq a0, a1, loop`, `jal ra, func`): no
/// modifier, so the operand is still the placeholder `Imm(0)` the parser
/// pushed.
fn resolve_plain_target(program: &mut ParsedProgram, p: &PendingRelocation, op_idx: usize, relocations: &mut Vec<Relocation>) -> Result<()> {
    let inst = &program.instructions[p.inst_index];
    let mnemonic = inst.opcode.name;
    let is_compressed = inst.opcode.is_compressed;
    let from = inst.offset_in_text;

    if let Some(target) = program.tracker.lookup_text(&p.symbol) {
        let delta = target as i64 - from as i64;
        if delta % 2 != 0 {
            return Err(SemanticError::MisalignedBranchTarget { loc: p.loc, delta }.into());
        }
        program.instructions[p.inst_index].operands[op_idx].rewrite_as_imm(delta);
        return Ok(());
    }

    let reloc_type = branch_or_jump_reloc_type(mnemonic, is_compressed);
    let symbol_index = program.tracker.ensure_symbol(&p.symbol);
    relocations.push(Relocation::new(from, symbol_index, reloc_type, 0));
    Ok(())
}

fn branch_or_jump_reloc_type(mnemonic: &str, is_compressed: bool) -> u32 {
    match mnemonic {
        "beq" | "bne" | "blt" | "bge" | "bltu" | "bgeu" => constants::R_RISCV_BRANCH,
        "c.beqz" | "c.bnez" => constants::R_RISCV_RVC_BRANCH,
        "jal" => constants::R_RISCV_JAL,
        "c.j" => constants::R_RISCV_RVC_JUMP,
        _ if is_compressed => constants::R_RISCV_RVC_JUMP,
        _ => constants::R_RISCV_JAL,
    }
}

/// `%pcrel_hi(sym)` on an `auipc`. `hi = (val + 0x800) & !0xfff`, always
/// already shifted into the encoder's expected `imm[31:12]` position.
fn resolve_pcrel_hi(
    program: &mut ParsedProgram,
    p: &PendingRelocation,
    op_idx: usize,
    symbol: &str,
    addend: i64,
    relocations: &mut Vec<Relocation>,
) -> Result<()> {
    let from = program.instructions[p.inst_index].offset_in_text;
    if let Some(target) = program.tracker.lookup_text(symbol) {
        let val = target as i64 + addend - from as i64;
        let hi = hi_lo_split(val).0;
        program.instructions[p.inst_index].operands[op_idx].rewrite_as_imm(hi);
        return Ok(());
    }
    let symbol_index = program.tracker.ensure_symbol(symbol);
    relocations.push(Relocation::new(from, symbol_index, constants::R_RISCV_PCREL_HI20, addend));
    program.instructions[p.inst_index].operands[op_idx].rewrite_as_imm(0);
    Ok(())
}

/// `%pcrel_lo(label)`: `label` names the anchor point (the `auipc`'s own
/// label), not the real target — recover the real target/addend pair and
/// the paired `auipc`'s instruction index from `pcrel_anchors`, then apply
/// the identical hi/lo split formula relative to that instruction's
/// offset, so hi and lo halves are always consistent with each other.
fn resolve_pcrel_lo(program: &mut ParsedProgram, p: &PendingRelocation, op_idx: usize, relocations: &mut Vec<Relocation>) -> Result<()> {
    let anchor = program
        .tracker
        .pcrel_anchors
        .get(&p.symbol)
        .cloned()
        .ok_or_else(|| SemanticError::UndefinedSymbol { loc: p.loc, name: p.symbol.clone() })?;

    let inst = &program.instructions[p.inst_index];
    let from = inst.offset_in_text;
    let immediate_shape = inst.opcode.immediate_shape();

    if let Some(target) = program.tracker.lookup_text(&anchor.symbol) {
        let hi_offset = program.instructions[anchor.hi_inst_index].offset_in_text;
        let val = target as i64 + anchor.addend - hi_offset as i64;
        let lo = hi_lo_split(val).1;
        program.instructions[p.inst_index].operands[op_idx].rewrite_as_imm(lo);
        return Ok(());
    }

    let symbol_index = program.tracker.ensure_symbol(&anchor.symbol);
    let reloc_type = match immediate_shape {
        ImmediateShape::SType => constants::R_RISCV_PCREL_LO12_S,
        _ => constants::R_RISCV_PCREL_LO12_I,
    };
    relocations.push(Relocation::new(from, symbol_index, reloc_type, anchor.addend));
    program.instructions[p.inst_index].operands[op_idx].rewrite_as_imm(0);
    Ok(())
}

/// `%hi`/`%lo`/`%got_pcrel_hi`/any TLS modifier. Tried directly against
/// `.text` first, exactly like `resolve_plain_target`/`resolve_pcrel_hi`:
/// if the symbol is already defined in this object, the matching half of
/// its hi/lo split can be computed now, for every modifier alike. Only a
/// symbol with no local definition falls back to a relocation.
fn resolve_absolute(
    program: &mut ParsedProgram,
    p: &PendingRelocation,
    op_idx: usize,
    modifier: Modifier,
    symbol: &str,
    addend: i64,
    relocations: &mut Vec<Relocation>,
) -> Result<()> {
    if let Some(target) = program.tracker.lookup_text(symbol) {
        let val = target as i64 + addend;
        let half = if modifier.width() == 12 { hi_lo_split(val).1 } else { hi_lo_split(val).0 };
        program.instructions[p.inst_index].operands[op_idx].rewrite_as_imm(half);
        return Ok(());
    }

    let inst = &program.instructions[p.inst_index];
    let from = inst.offset_in_text;
    let immediate_shape = inst.opcode.immediate_shape();
    let reloc_type = match modifier {
        Modifier::Hi => constants::R_RISCV_HI20,
        Modifier::Lo => match immediate_shape {
            ImmediateShape::SType => constants::R_RISCV_LO12_S,
            _ => constants::R_RISCV_LO12_I,
        },
        Modifier::GotPcrelHi => constants::R_RISCV_GOT_HI20,
        Modifier::TprelHi => constants::R_RISCV_TPREL_HI20,
        Modifier::TprelAdd => constants::R_RISCV_TPREL_ADD,
        Modifier::TlsIePcrelHi => constants::R_RISCV_TLS_GOT_HI20,
        Modifier::TlsGdPcrelHi => constants::R_RISCV_TLS_GD_HI20,
        Modifier::PcrelHi | Modifier::PcrelLo => unreachable!("handled by the PC-relative-capable path"),
    };

    let symbol_index = program.tracker.ensure_symbol(symbol);
    relocations.push(Relocation::new(from, symbol_index, reloc_type, addend));
    program.instructions[p.inst_index].operands[op_idx].rewrite_as_imm(0);
    Ok(())
}

/// Splits a 32-bit-range value into its `lui`/`auipc`-style hi20 (already
/// shifted into bits 31:12) and the signed lo12 remainder, following the
/// conventional round-to-nearest `+0x800` correction so `hi + sext(lo) ==
/// val`.
fn hi_lo_split(val: i64) -> (i64, i64) {
    let hi = val.wrapping_add(0x800) & !0xfff;
    let lo = val.wrapping_sub(hi);
    (hi, lo)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn forward_branch_resolves_directly_without_a_relocation() {
        let program = parse("beq x1, x2, target\nnop\ntarget:\nnop\n").unwrap();
        let resolved = resolve(program).unwrap();
        assert!(resolved.relocations.is_empty());
        assert_eq!(resolved.instructions[0].operands[2].as_imm(), 8);
    }

    #[test]
    fn jump_to_extern_symbol_emits_a_relocation() {
        let program = parse("jal ra, extern_func\n").unwrap();
        let resolved = resolve(program).unwrap();
        assert_eq!(resolved.relocations.len(), 1);
        assert_eq!(resolved.relocations[0].reloc_type, constants::R_RISCV_JAL);
    }

    #[test]
    fn hi_lo_pair_against_extern_symbol_emits_two_relocations() {
        let program = parse("lui x5, %hi(msg)\naddi x5, x5, %lo(msg)\n").unwrap();
        let resolved = resolve(program).unwrap();
        assert_eq!(resolved.relocations.len(), 2);
        assert_eq!(resolved.relocations[0].reloc_type, constants::R_RISCV_HI20);
        assert_eq!(resolved.relocations[1].reloc_type, constants::R_RISCV_LO12_I);
    }

    #[test]
    fn hi_lo_pair_resolves_directly_against_a_local_text_symbol() {
        let src = "lui x5, %hi(start)\naddi x5, x5, %lo(start)\nstart:\nnop\n";
        let program = parse(src).unwrap();
        let resolved = resolve(program).unwrap();
        assert!(resolved.relocations.is_empty());
        let (hi, lo) = hi_lo_split(8);
        assert_eq!(resolved.instructions[0].operands[1].as_imm(), hi);
        assert_eq!(resolved.instructions[1].operands[2].as_imm(), lo);
    }

    #[test]
    fn pcrel_hi_lo_pair_resolves_directly_against_a_local_text_symbol() {
        let src = "start:\nauipc x5, %pcrel_hi(start)\naddi x5, x5, %pcrel_lo(start)\n";
        let program = parse(src).unwrap();
        let resolved = resolve(program).unwrap();
        assert!(resolved.relocations.is_empty());
    }

    #[test]
    fn hi_lo_split_reassembles_the_original_value() {
        let (hi, lo) = hi_lo_split(0x12345678);
        assert_eq!(hi + lo, 0x12345678);
        assert!((-2048..2048).contains(&lo));
    }
}
