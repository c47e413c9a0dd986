//! Recursive-descent parser: turns a token stream into an instruction
//! arena, `.data`/`.bss` byte buffers and a populated [`SymbolTracker`].
//!
//! Surface grammar (which token order a mnemonic reads off the line) is
//! decided per mnemonic *class* by [`classify`]; how those operands land in
//! the encoder's operand vector is decided generically, per opcode
//! template, by [`order_registers`] — the two concerns are independent, so
//! neither needs per-mnemonic special-casing for the other's sake.

use mc::instruction::Instruction;
use mc::opcode::{signed_width, BitRanges, EncodingField, OpcodeTemplate};
use mc::operand::{Expression, Modifier, Operand};
use elfobj::SectionRef;

use crate::error::{Result, SemanticError, SyntaxError};
use crate::lexer::{Lexer, SourceLoc, Token, TokenKind};
use crate::symbols::{PcrelAnchor, SymbolTracker};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Section {
    Text,
    Data,
    Bss,
}

/// Which of an opcode's register-family fields a parsed operand binds to.
/// Populated per mnemonic-class surface grammar; consumed, in the
/// template's own field order, by [`order_registers`].
#[derive(Clone, Copy, Default, Debug)]
pub(crate) struct RegisterRoles {
    pub rd: Option<u8>,
    pub rs1: Option<u8>,
    pub rs2: Option<u8>,
    pub rs3: Option<u8>,
}

/// The value (or symbolic reference) that fills an opcode's sole
/// immediate-family slot.
#[derive(Clone, Debug)]
pub(crate) enum ImmSource {
    Literal(i64),
    Symbol { modifier: Option<Modifier>, name: String, addend: i64 },
}

/// A mnemonic's surface operand grammar. Structurally identical shapes
/// (e.g. plain int R-type and fp binary-no-rm ops) are merged: the
/// *encoding* difference between an int and fp register operand is just
/// which name the programmer wrote (`a0` vs `fa0`) — both resolve to the
/// same 5-bit slot, so the parser never needs to know which bank a field
/// expects.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Shape {
    RRR,
    RRI,
    RR,
    Load,
    Store,
    Branch,
    Jal,
    Jalr,
    U,
    NoOperands,
    Fence,
    AmoLoad,
    Amo,
    FR2,
    FR3,
    FR4,
    CI,
    CIC,
    CL,
    CS,
    CA,
    CB,
    CJ,
    CR1,
    CR,
    CSS,
    CSP,
    CNone,
}

fn classify(name: &str) -> Shape {
    match name {
        "ecall" | "ebreak" => Shape::NoOperands,
        "c.ebreak" => Shape::CNone,
        "fence" => Shape::Fence,
        "jal" => Shape::Jal,
        "jalr" => Shape::Jalr,
        "lui" | "auipc" => Shape::U,
        "c.lui" | "c.li" | "c.slli" => Shape::CI,
        _ if name.starts_with("c.addi") => Shape::CI,
        "c.addi16sp" => Shape::CSP,
        "c.addi4spn" => Shape::CIC,
        "c.srli" | "c.srai" | "c.andi" => Shape::CIC,
        "c.j" => Shape::CJ,
        "c.jr" | "c.jalr" => Shape::CR1,
        "c.mv" | "c.add" => Shape::CR,
        "c.beqz" | "c.bnez" => Shape::CB,
        "c.sub" | "c.xor" | "c.or" | "c.and" | "c.subw" | "c.addw" => Shape::CA,
        "c.swsp" | "c.sdsp" | "c.fsdsp" => Shape::CSS,
        "c.lwsp" | "c.ldsp" | "c.fldsp" => Shape::CI,
        _ if name == "c.fld" || name.starts_with("c.l") => Shape::CL,
        _ if name == "c.fsd" || name.starts_with("c.s") => Shape::CS,
        _ if name.starts_with("lr.") => Shape::AmoLoad,
        _ if name.starts_with("sc.") || name.starts_with("amo") => Shape::Amo,
        "lb" | "lh" | "lw" | "lbu" | "lhu" | "lwu" | "ld" | "flw" | "fld" => Shape::Load,
        "sb" | "sh" | "sw" | "sd" | "fsw" | "fsd" => Shape::Store,
        "beq" | "bne" | "blt" | "bge" | "bltu" | "bgeu" => Shape::Branch,
        "fsqrt.s" | "fsqrt.d" => Shape::FR2,
        _ if name.starts_with("fcvt.") => Shape::FR2,
        "fmv.x.w" | "fmv.x.d" | "fmv.w.x" | "fmv.d.x" | "fclass.s" | "fclass.d" => Shape::RR,
        "fadd.s" | "fsub.s" | "fmul.s" | "fdiv.s" | "fadd.d" | "fsub.d" | "fmul.d" | "fdiv.d" => Shape::FR3,
        _ if name.starts_with("fmadd.") || name.starts_with("fmsub.") || name.starts_with("fnmsub.") || name.starts_with("fnmadd.") => {
            Shape::FR4
        }
        _ => Shape::RRR,
    }
}

/// Walks an opcode's fields in their declared (LSB -> MSB) order, emitting
/// one register operand per register-family field in that order — which is
/// exactly the order [`mc::encoder::encode`] consumes them in, regardless
/// of how the surface grammar wrote them (e.g. a store's value register
/// reads first in `sw rs2, off(rs1)` syntax but its field order is
/// `Rs1` then `Rs2`).
pub(crate) fn order_registers(opcode: &'static OpcodeTemplate, regs: &RegisterRoles) -> Vec<Operand> {
    let mut out = Vec::new();
    for field in &opcode.fields {
        let value = match field {
            EncodingField::Rd | EncodingField::RdC => regs.rd,
            EncodingField::Rs1 | EncodingField::Rs1C => regs.rs1,
            EncodingField::Rs2 | EncodingField::Rs2C => regs.rs2,
            EncodingField::Rs3 | EncodingField::Rs3C => regs.rs3,
            _ => continue,
        };
        let n = value.unwrap_or_else(|| panic!("{}: register role required by template not supplied", opcode.name));
        out.push(Operand::make_reg(n));
    }
    out
}

/// Checks a directly-written literal immediate against the signed width its
/// opcode field declares (e.g. ADDI's 12-bit I-type range is -2048..2047).
/// Symbolic immediates aren't checked here since their value isn't known
/// until the relocator settles them.
fn check_immediate_range(loc: SourceLoc, value: i64, ranges: &BitRanges) -> Result<()> {
    if ranges.iter().any(|&(_, lo)| lo != 0) {
        // U-type fields (imm[31:12]) arrive pre-shifted into position by
        // `u_immediate`; what lands here is a raw bit pattern, not a signed
        // magnitude, so there's no meaningful range to reject.
        return Ok(());
    }
    let width = signed_width(ranges);
    let min = -(1i64 << (width - 1));
    let max = (1i64 << (width - 1)) - 1;
    if value < min || value > max {
        return Err(SemanticError::ImmediateOutOfRange { loc, value, width }.into());
    }
    Ok(())
}

pub struct ParsedProgram {
    pub instructions: Vec<Instruction>,
    pub data: Vec<u8>,
    pub bss_size: u64,
    pub tracker: SymbolTracker,
}

pub(crate) struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    tracker: SymbolTracker,
    instructions: Vec<Instruction>,
    data: Vec<u8>,
    bss_size: u64,
    section: Section,
    text_len: u64,
    pending_label: Option<String>,
    anchor_counter: usize,
}

pub fn parse(source: &str) -> Result<ParsedProgram> {
    let tokens = Lexer::lex(source)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        tracker: SymbolTracker::new(),
        instructions: Vec::new(),
        data: Vec::new(),
        bss_size: 0,
        section: Section::Text,
        text_len: 0,
        pending_label: None,
        anchor_counter: 0,
    };
    loop {
        match parser.peek_kind() {
            TokenKind::Eof => break,
            TokenKind::Newline => {
                parser.advance();
            }
            _ => parser.parse_line()?,
        }
    }
    Ok(ParsedProgram {
        instructions: parser.instructions,
        data: parser.data,
        bss_size: parser.bss_size,
        tracker: parser.tracker,
    })
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if !matches!(tok.kind, TokenKind::Eof) {
            self.pos += 1;
        }
        tok
    }

    fn comma(&mut self) -> Result<()> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Comma => Ok(()),
            _ => Err(SyntaxError::UnexpectedToken { loc: tok.loc, found: tok.lexeme, expected: "," }.into()),
        }
    }

    /// Exposed for pseudo-instruction expansion, which reads its own
    /// operand grammar off the same token stream.
    pub(crate) fn comma_pub(&mut self) -> Result<()> {
        self.comma()
    }

    /// A unique label text for a pseudo-expanded `%pcrel_hi`/`%pcrel_lo`
    /// pair that has no source-level label to anchor on.
    pub(crate) fn next_anchor_id(&mut self) -> usize {
        self.anchor_counter += 1;
        self.anchor_counter
    }

    pub(crate) fn tracker_mut(&mut self) -> &mut SymbolTracker {
        &mut self.tracker
    }

    /// Index of the most recently emitted instruction.
    pub(crate) fn last_inst_index(&self) -> usize {
        self.instructions.len() - 1
    }

    fn lparen(&mut self) -> Result<()> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::LParen => Ok(()),
            _ => Err(SyntaxError::UnexpectedToken { loc: tok.loc, found: tok.lexeme, expected: "(" }.into()),
        }
    }

    fn rparen(&mut self) -> Result<()> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::RParen => Ok(()),
            _ => Err(SyntaxError::UnexpectedToken { loc: tok.loc, found: tok.lexeme, expected: ")" }.into()),
        }
    }

    pub(crate) fn reg(&mut self) -> Result<u8> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Register(n) => Ok(n),
            _ => Err(SyntaxError::UnknownRegister { loc: tok.loc, name: tok.lexeme }.into()),
        }
    }

    fn fence_set(&mut self) -> Result<u8> {
        let tok = self.advance();
        match &tok.kind {
            TokenKind::Integer(v) => Ok((*v as u8) & 0xf),
            TokenKind::Identifier => {
                let mut bits = 0u8;
                for c in tok.lexeme.chars() {
                    bits |= match c {
                        'i' => 0b1000,
                        'o' => 0b0100,
                        'r' => 0b0010,
                        'w' => 0b0001,
                        _ => {
                            return Err(SyntaxError::UnexpectedToken {
                                loc: tok.loc,
                                found: tok.lexeme.clone(),
                                expected: "fence set built from i/o/r/w",
                            }
                            .into())
                        }
                    };
                }
                Ok(bits)
            }
            _ => Err(SyntaxError::UnexpectedToken { loc: tok.loc, found: tok.lexeme, expected: "fence set" }.into()),
        }
    }

    fn optional_rounding_mode(&mut self) -> Result<Option<u8>> {
        if !matches!(self.peek_kind(), TokenKind::Comma) {
            return Ok(None);
        }
        self.advance();
        let tok = self.advance();
        let name = tok.lexeme.to_ascii_lowercase();
        let code = match name.as_str() {
            "rne" => 0,
            "rtz" => 1,
            "rdn" => 2,
            "rup" => 3,
            "rmm" => 4,
            "dyn" => 7,
            _ => return Err(SemanticError::UndefinedRoundingMode { loc: tok.loc, name }.into()),
        };
        Ok(Some(code))
    }

    pub(crate) fn operand_value(&mut self) -> Result<ImmSource> {
        match &self.tokens[self.pos].kind {
            TokenKind::Integer(v) => {
                let v = *v;
                self.advance();
                Ok(ImmSource::Literal(v))
            }
            TokenKind::Modifier => {
                let tok = self.advance();
                let modifier = Modifier::from_token(&tok.lexeme)
                    .ok_or_else(|| SyntaxError::UnknownModifier { loc: tok.loc, name: tok.lexeme.clone() })?;
                self.lparen()?;
                let name_tok = self.advance();
                let name = match name_tok.kind {
                    TokenKind::Identifier | TokenKind::Instruction => name_tok.lexeme,
                    _ => {
                        return Err(SyntaxError::UnexpectedToken {
                            loc: name_tok.loc,
                            found: name_tok.lexeme,
                            expected: "symbol name",
                        }
                        .into())
                    }
                };
                self.rparen()?;
                Ok(ImmSource::Symbol { modifier: Some(modifier), name, addend: 0 })
            }
            TokenKind::Identifier => {
                let tok = self.advance();
                Ok(ImmSource::Symbol { modifier: None, name: tok.lexeme, addend: 0 })
            }
            _ => {
                let tok = self.peek().clone();
                Err(SyntaxError::UnexpectedToken { loc: tok.loc, found: tok.lexeme, expected: "immediate or symbol" }.into())
            }
        }
    }

    fn u_immediate(&mut self) -> Result<ImmSource> {
        match self.operand_value()? {
            // A literal `lui rd, 0x12345` writes the unshifted 20-bit
            // value; the encoder's imm[31:12] field expects it already
            // shifted into place (see encoder.rs's `stitch` doc comment).
            ImmSource::Literal(v) => Ok(ImmSource::Literal(v << 12)),
            other => Ok(other),
        }
    }

    fn parse_line(&mut self) -> Result<()> {
        while matches!(self.peek_kind(), TokenKind::LabelDef) {
            let tok = self.advance();
            self.define_label(&tok.lexeme, tok.loc)?;
        }
        match self.peek_kind() {
            TokenKind::Directive => self.parse_directive(),
            TokenKind::Instruction => self.parse_instruction(),
            TokenKind::Newline | TokenKind::Eof => Ok(()),
            _ => {
                let tok = self.peek().clone();
                Err(SyntaxError::UnexpectedToken { loc: tok.loc, found: tok.lexeme, expected: "instruction or directive" }.into())
            }
        }
    }

    fn define_label(&mut self, name: &str, loc: SourceLoc) -> Result<()> {
        let (section_ref, offset) = match self.section {
            Section::Text => (SectionRef::Text, self.text_len),
            Section::Data => (SectionRef::Data, self.data.len() as u64),
            Section::Bss => (SectionRef::Bss, self.bss_size),
        };
        self.tracker.declare_label(name, section_ref, offset, loc)?;
        self.pending_label = Some(name.to_string());
        Ok(())
    }

    fn parse_directive(&mut self) -> Result<()> {
        let tok = self.advance();
        let name = tok.lexeme.to_ascii_lowercase();
        match name.as_str() {
            ".text" => self.section = Section::Text,
            ".data" => self.section = Section::Data,
            ".bss" => self.section = Section::Bss,
            ".global" | ".globl" => loop {
                let ident = self.advance();
                match ident.kind {
                    TokenKind::Identifier | TokenKind::Instruction => self.tracker.declare_global(&ident.lexeme),
                    _ => {
                        return Err(SyntaxError::UnexpectedToken {
                            loc: ident.loc,
                            found: ident.lexeme,
                            expected: "symbol name",
                        }
                        .into())
                    }
                }
                if matches!(self.peek_kind(), TokenKind::Comma) {
                    self.advance();
                    continue;
                }
                break;
            },
            ".byte" => self.emit_integer_list(1)?,
            ".half" => self.emit_integer_list(2)?,
            ".word" => self.emit_integer_list(4)?,
            ".dword" => self.emit_integer_list(8)?,
            ".float" => self.emit_float_list(false)?,
            ".double" => self.emit_float_list(true)?,
            ".zero" => {
                let n = self.integer_literal()?;
                self.emit_zero(n as u64);
            }
            ".align" => {
                let n = self.integer_literal()?;
                self.align_to(1u64 << n);
            }
            ".balign" => {
                let n = self.integer_literal()?;
                self.align_to(n as u64);
            }
            _ => return Err(SyntaxError::UnexpectedToken { loc: tok.loc, found: tok.lexeme, expected: "directive" }.into()),
        }
        Ok(())
    }

    fn integer_literal(&mut self) -> Result<i64> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Integer(v) => Ok(v),
            _ => Err(SyntaxError::UnexpectedToken { loc: tok.loc, found: tok.lexeme, expected: "integer literal" }.into()),
        }
    }

    fn emit_integer_list(&mut self, width: usize) -> Result<()> {
        loop {
            let v = self.integer_literal()?;
            match width {
                1 => self.data.push(v as u8),
                2 => self.data.extend_from_slice(&(v as u16).to_le_bytes()),
                4 => self.data.extend_from_slice(&(v as u32).to_le_bytes()),
                8 => self.data.extend_from_slice(&(v as u64).to_le_bytes()),
                _ => unreachable!(),
            }
            if matches!(self.peek_kind(), TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        Ok(())
    }

    fn emit_float_list(&mut self, is_double: bool) -> Result<()> {
        loop {
            let tok = self.advance();
            match tok.kind {
                TokenKind::Float(f) => {
                    if is_double {
                        self.data.extend_from_slice(&f.to_le_bytes());
                    } else {
                        self.data.extend_from_slice(&(f as f32).to_le_bytes());
                    }
                }
                TokenKind::Integer(v) => {
                    if is_double {
                        self.data.extend_from_slice(&(v as f64).to_le_bytes());
                    } else {
                        self.data.extend_from_slice(&(v as f32).to_le_bytes());
                    }
                }
                _ => {
                    return Err(SyntaxError::UnexpectedToken {
                        loc: tok.loc,
                        found: tok.lexeme,
                        expected: "floating-point literal",
                    }
                    .into())
                }
            }
            if matches!(self.peek_kind(), TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        Ok(())
    }

    fn emit_zero(&mut self, n: u64) {
        match self.section {
            Section::Bss => self.bss_size += n,
            _ => self.data.extend(std::iter::repeat(0u8).take(n as usize)),
        }
    }

    fn align_to(&mut self, alignment: u64) {
        if alignment <= 1 {
            return;
        }
        match self.section {
            Section::Bss => {
                let rem = self.bss_size % alignment;
                if rem != 0 {
                    self.bss_size += alignment - rem;
                }
            }
            Section::Data => {
                let rem = self.data.len() as u64 % alignment;
                if rem != 0 {
                    self.data.extend(std::iter::repeat(0u8).take((alignment - rem) as usize));
                }
            }
            // Every supported instruction is already 2- or 4-byte sized
            // and the encoder never mixes compressed/plain mid-word, so
            // `.text` is always naturally aligned.
            Section::Text => {}
        }
    }

    fn parse_instruction(&mut self) -> Result<()> {
        let tok = self.advance();
        let loc = tok.loc;
        let mnemonic = mc::opcode::normalize_mnemonic(&tok.lexeme);
        let anchor_label = self.pending_label.take();

        if crate::pseudo::is_pseudo_mnemonic(&mnemonic) {
            return crate::pseudo::expand(self, &mnemonic, anchor_label, loc);
        }

        let shape = classify(&mnemonic);
        let (regs, imm, rm, fence) = self.parse_operands(shape, loc)?;
        self.build_and_emit(&mnemonic, regs, imm, rm, fence, anchor_label, loc)?;
        Ok(())
    }

    fn parse_operands(
        &mut self,
        shape: Shape,
        loc: SourceLoc,
    ) -> Result<(RegisterRoles, Option<ImmSource>, Option<u8>, Option<(u8, u8)>)> {
        let _ = loc;
        let mut regs = RegisterRoles::default();
        let mut imm = None;
        let mut rm = None;
        let mut fence = None;
        match shape {
            Shape::RRR => {
                regs.rd = Some(self.reg()?);
                self.comma()?;
                regs.rs1 = Some(self.reg()?);
                self.comma()?;
                regs.rs2 = Some(self.reg()?);
            }
            Shape::RRI => {
                regs.rd = Some(self.reg()?);
                self.comma()?;
                regs.rs1 = Some(self.reg()?);
                self.comma()?;
                imm = Some(self.operand_value()?);
            }
            Shape::RR => {
                regs.rd = Some(self.reg()?);
                self.comma()?;
                regs.rs1 = Some(self.reg()?);
            }
            Shape::Load | Shape::Jalr => {
                regs.rd = Some(self.reg()?);
                self.comma()?;
                imm = Some(self.operand_value()?);
                self.lparen()?;
                regs.rs1 = Some(self.reg()?);
                self.rparen()?;
            }
            Shape::Store => {
                regs.rs2 = Some(self.reg()?);
                self.comma()?;
                imm = Some(self.operand_value()?);
                self.lparen()?;
                regs.rs1 = Some(self.reg()?);
                self.rparen()?;
            }
            Shape::Branch => {
                regs.rs1 = Some(self.reg()?);
                self.comma()?;
                regs.rs2 = Some(self.reg()?);
                self.comma()?;
                imm = Some(self.operand_value()?);
            }
            Shape::Jal => {
                regs.rd = Some(self.reg()?);
                self.comma()?;
                imm = Some(self.operand_value()?);
            }
            Shape::U => {
                regs.rd = Some(self.reg()?);
                self.comma()?;
                imm = Some(self.u_immediate()?);
            }
            Shape::NoOperands | Shape::CNone => {}
            Shape::Fence => {
                let pred = self.fence_set()?;
                self.comma()?;
                let succ = self.fence_set()?;
                fence = Some((pred, succ));
            }
            Shape::AmoLoad => {
                regs.rd = Some(self.reg()?);
                self.comma()?;
                self.lparen()?;
                regs.rs1 = Some(self.reg()?);
                self.rparen()?;
            }
            Shape::Amo => {
                regs.rd = Some(self.reg()?);
                self.comma()?;
                regs.rs2 = Some(self.reg()?);
                self.comma()?;
                self.lparen()?;
                regs.rs1 = Some(self.reg()?);
                self.rparen()?;
            }
            Shape::FR2 => {
                regs.rd = Some(self.reg()?);
                self.comma()?;
                regs.rs1 = Some(self.reg()?);
                rm = self.optional_rounding_mode()?;
            }
            Shape::FR3 => {
                regs.rd = Some(self.reg()?);
                self.comma()?;
                regs.rs1 = Some(self.reg()?);
                self.comma()?;
                regs.rs2 = Some(self.reg()?);
                rm = self.optional_rounding_mode()?;
            }
            Shape::FR4 => {
                regs.rd = Some(self.reg()?);
                self.comma()?;
                regs.rs1 = Some(self.reg()?);
                self.comma()?;
                regs.rs2 = Some(self.reg()?);
                self.comma()?;
                regs.rs3 = Some(self.reg()?);
                rm = self.optional_rounding_mode()?;
            }
            Shape::CI | Shape::CIC => {
                regs.rd = Some(self.reg()?);
                self.comma()?;
                imm = Some(self.operand_value()?);
            }
            Shape::CL => {
                regs.rd = Some(self.reg()?);
                self.comma()?;
                imm = Some(self.operand_value()?);
                self.lparen()?;
                regs.rs1 = Some(self.reg()?);
                self.rparen()?;
            }
            Shape::CS => {
                regs.rs2 = Some(self.reg()?);
                self.comma()?;
                imm = Some(self.operand_value()?);
                self.lparen()?;
                regs.rs1 = Some(self.reg()?);
                self.rparen()?;
            }
            Shape::CA | Shape::CR => {
                regs.rd = Some(self.reg()?);
                self.comma()?;
                regs.rs2 = Some(self.reg()?);
            }
            Shape::CB => {
                regs.rs1 = Some(self.reg()?);
                self.comma()?;
                imm = Some(self.operand_value()?);
            }
            Shape::CJ | Shape::CSP => {
                imm = Some(self.operand_value()?);
            }
            Shape::CR1 => {
                regs.rs1 = Some(self.reg()?);
            }
            Shape::CSS => {
                regs.rs2 = Some(self.reg()?);
                self.comma()?;
                imm = Some(self.operand_value()?);
            }
        }
        Ok((regs, imm, rm, fence))
    }

    /// Builds an instruction's operand vector from already-classified
    /// pieces and appends it to the arena, registering a pending
    /// relocation if its immediate turned out to be symbolic. Shared by
    /// the direct-mnemonic path and pseudo-instruction expansion.
    pub(crate) fn build_and_emit(
        &mut self,
        mnemonic: &str,
        regs: RegisterRoles,
        imm: Option<ImmSource>,
        rm: Option<u8>,
        fence: Option<(u8, u8)>,
        anchor_label: Option<String>,
        loc: SourceLoc,
    ) -> Result<usize> {
        let opcode = mc::OPCODES
            .lookup(mnemonic)
            .ok_or_else(|| SyntaxError::UnknownMnemonic { loc, mnemonic: mnemonic.to_string() })?;
        let mut operands = order_registers(opcode, &regs);

        let has_imm_field = opcode.fields.iter().any(|f| f.ranges().is_some());
        let has_rm_field = opcode.fields.iter().any(|f| matches!(f, EncodingField::Rm));
        let has_fence_field = opcode.fields.iter().any(|f| matches!(f, EncodingField::MemFence));

        let inst_index = self.instructions.len();
        let mut pending_symbol = None;

        if has_imm_field {
            match imm {
                Some(ImmSource::Literal(v)) => {
                    let ranges = opcode
                        .fields
                        .iter()
                        .find_map(|f| f.ranges())
                        .expect("has_imm_field implies a ranges-bearing field");
                    check_immediate_range(loc, v, ranges)?;
                    operands.push(Operand::make_imm(v));
                }
                Some(ImmSource::Symbol { modifier, name, addend }) => {
                    match modifier {
                        Some(m) => operands.push(Operand::make_expr(Expression::new(m, name.clone(), addend))),
                        None => operands.push(Operand::make_imm(0)),
                    }
                    if matches!(modifier, Some(Modifier::PcrelHi)) {
                        if let Some(label) = &anchor_label {
                            self.tracker.pcrel_anchors.insert(
                                label.clone(),
                                PcrelAnchor { symbol: name.clone(), addend, hi_inst_index: inst_index },
                            );
                        }
                    }
                    pending_symbol = Some(name);
                }
                None => return Err(SyntaxError::MissingOperand { loc, mnemonic: mnemonic.to_string() }.into()),
            }
        }
        if has_rm_field {
            operands.push(Operand::make_imm(rm.unwrap_or(0) as i64));
        }
        if has_fence_field {
            let (pred, succ) = fence.unwrap_or((0b1111, 0b1111));
            operands.push(Operand::make_imm(pred as i64));
            operands.push(Operand::make_imm(succ as i64));
        }

        let mut inst = Instruction::new(opcode, loc, operands);
        inst.offset_in_text = self.text_len;
        self.text_len += inst.size();
        self.instructions.push(inst);

        if let Some(name) = pending_symbol {
            self.tracker.add_pending(inst_index, name, loc);
        }
        Ok(inst_index)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;

    #[test]
    fn addi_resolves_registers_and_immediate() {
        let program = parse("addi x1, x0, 5\n").unwrap();
        assert_eq!(program.instructions.len(), 1);
        let inst = &program.instructions[0];
        assert_eq!(inst.opcode.name.to_ascii_lowercase(), "addi");
        assert_eq!(inst.operands[0].as_reg(), 1);
        assert_eq!(inst.operands[1].as_reg(), 0);
        assert_eq!(inst.operands[2].as_imm(), 5);
    }

    #[test]
    fn sw_orders_base_before_value_per_template() {
        let program = parse("sw x2, -4(x8)\n").unwrap();
        let inst = &program.instructions[0];
        // SW's template consumes Rs1 (base) before Rs2 (value), even
        // though the surface syntax writes the value register first.
        assert_eq!(inst.operands[0].as_reg(), 8);
        assert_eq!(inst.operands[1].as_reg(), 2);
        assert_eq!(inst.operands[2].as_imm(), -4);
    }

    #[test]
    fn label_then_branch_registers_pending_relocation() {
        let program = parse("beq x1, x2, target\ntarget:\n").unwrap();
        assert_eq!(program.tracker.pending.len(), 1);
        assert_eq!(program.tracker.pending[0].symbol, "target");
    }

    #[test]
    fn global_directive_is_tracked() {
        let program = parse(".global main\nmain:\naddi x0, x0, 0\n").unwrap();
        assert_eq!(program.tracker.global_symbols.len(), 1);
        assert!(program.tracker.global_symbols.contains_key(&"main".to_string()));
    }

    #[test]
    fn data_word_directive_emits_little_endian_bytes() {
        let program = parse(".data\n.word 0xdeadbeef\n").unwrap();
        assert_eq!(program.data, vec![0xef, 0xbe, 0xad, 0xde]);
    }

    #[test]
    fn lui_shifts_literal_into_bit_position() {
        let program = parse("lui x5, 0x12345\n").unwrap();
        let inst = &program.instructions[0];
        assert_eq!(inst.operands[1].as_imm(), 0x12345 << 12);
    }

    #[test]
    fn addi_immediate_out_of_12_bit_range_is_an_error() {
        let err = parse("addi x1, x0, 99999\n").unwrap_err();
        match err {
            Error::Semantic(SemanticError::ImmediateOutOfRange { value, width, .. }) => {
                assert_eq!(value, 99999);
                assert_eq!(width, 12);
            }
            other => panic!("expected ImmediateOutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn addi_immediate_at_the_boundary_is_accepted() {
        assert!(parse("addi x1, x0, 2047\n").is_ok());
        assert!(parse("addi x1, x0, -2048\n").is_ok());
        assert!(parse("addi x1, x0, 2048\n").is_err());
    }

    #[test]
    fn lui_large_literal_is_not_rejected_by_range_checking() {
        let program = parse("lui x5, 0xfffff\n").unwrap();
        let inst = &program.instructions[0];
        assert_eq!(inst.operands[1].as_imm(), 0xfffffi64 << 12);
    }
}
