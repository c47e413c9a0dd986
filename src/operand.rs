//! The operand model: a tagged union of everything an instruction slot can
//! hold, plus the `%modifier(symbol)` expression syntax used by RISC-V's
//! `%hi`/`%lo`/TLS relocations.

/// Selects a relocation flavour for a symbolic expression operand
/// (`%hi(sym)`, `%lo(sym)`, ...).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Modifier {
    Lo,
    Hi,
    PcrelLo,
    PcrelHi,
    GotPcrelHi,
    TprelAdd,
    TprelHi,
    TlsIePcrelHi,
    TlsGdPcrelHi,
}

impl Modifier {
    /// Recognises the surface token (`%lo`, `%pcrel_hi`, ...), returning
    /// `None` for anything else.
    pub fn from_token(token: &str) -> Option<Modifier> {
        Some(match token {
            "%lo" => Modifier::Lo,
            "%hi" => Modifier::Hi,
            "%pcrel_lo" => Modifier::PcrelLo,
            "%pcrel_hi" => Modifier::PcrelHi,
            "%got_pcrel_hi" => Modifier::GotPcrelHi,
            "%tprel_add" => Modifier::TprelAdd,
            "%tprel_hi" => Modifier::TprelHi,
            "%tls_ie_pcrel_hi" => Modifier::TlsIePcrelHi,
            "%tls_gd_pcrel_hi" => Modifier::TlsGdPcrelHi,
            _ => return None,
        })
    }

    /// The bit width of the immediate this modifier ultimately produces:
    /// 12 for the `_lo` family, 20 for everything else.
    pub fn width(self) -> u32 {
        match self {
            Modifier::Lo | Modifier::PcrelLo => 12,
            _ => 20,
        }
    }
}

/// A symbolic expression operand, e.g. `%hi(msg)` or `%lo(msg+4)`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Expression {
    pub kind: Modifier,
    pub symbol: String,
    pub addend: i64,
}

impl Expression {
    pub fn new(kind: Modifier, symbol: impl Into<String>, addend: i64) -> Expression {
        Expression {
            kind,
            symbol: symbol.into(),
            addend,
        }
    }
}

/// A single operand value. At most one immediate-family variant
/// (`Imm`/`SFPImm`/`DFPImm`) and at most one `Expr` ever coexist on the same
/// instruction, since they occupy the same logical encoding slot.
#[derive(Clone, PartialEq, Debug)]
pub enum Operand {
    Register(u8),
    Imm(i64),
    SFPImm(u32),
    DFPImm(u64),
    Expr(Expression),
    /// Reserved for pseudo-instruction expansion bookkeeping.
    Inst(usize),
}

impl Operand {
    pub fn make_reg(n: u8) -> Operand {
        Operand::Register(n)
    }

    pub fn make_imm(v: i64) -> Operand {
        Operand::Imm(v)
    }

    pub fn make_sfp(bits: u32) -> Operand {
        Operand::SFPImm(bits)
    }

    pub fn make_dfp(bits: u64) -> Operand {
        Operand::DFPImm(bits)
    }

    pub fn make_expr(expr: Expression) -> Operand {
        Operand::Expr(expr)
    }

    pub fn as_reg(&self) -> u8 {
        match self {
            Operand::Register(n) => *n,
            other => panic!("operand is not a register: {:?}", other),
        }
    }

    pub fn as_imm(&self) -> i64 {
        match self {
            Operand::Imm(v) => *v,
            other => panic!("operand is not an immediate: {:?}", other),
        }
    }

    /// Any immediate-family operand reinterpreted as a 64-bit bag of bits,
    /// for the encoder's bit-range stitcher.
    pub fn as_gimm(&self) -> u64 {
        match self {
            Operand::Imm(v) => *v as u64,
            Operand::SFPImm(bits) => *bits as u64,
            Operand::DFPImm(bits) => *bits,
            other => panic!("operand does not carry an immediate bag of bits: {:?}", other),
        }
    }

    pub fn as_expr(&self) -> &Expression {
        match self {
            Operand::Expr(e) => e,
            other => panic!("operand is not an expression: {:?}", other),
        }
    }

    pub fn is_expr(&self) -> bool {
        matches!(self, Operand::Expr(_))
    }

    /// Mutates an `Expr` (or already-resolved `Imm`) operand into a plain
    /// immediate in place. Used by the relocator once it has resolved (or
    /// decided to defer) a symbol reference.
    pub fn rewrite_as_imm(&mut self, bits: i64) {
        *self = Operand::Imm(bits);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn modifier_token_roundtrip() {
        assert_eq!(Modifier::from_token("%hi"), Some(Modifier::Hi));
        assert_eq!(Modifier::from_token("%pcrel_lo"), Some(Modifier::PcrelLo));
        assert_eq!(Modifier::from_token("%bogus"), None);
    }

    #[test]
    fn modifier_widths() {
        assert_eq!(Modifier::Lo.width(), 12);
        assert_eq!(Modifier::PcrelLo.width(), 12);
        assert_eq!(Modifier::Hi.width(), 20);
        assert_eq!(Modifier::TlsGdPcrelHi.width(), 20);
    }

    #[test]
    fn rewrite_as_imm_replaces_expr() {
        let mut op = Operand::make_expr(Expression::new(Modifier::Hi, "msg", 0));
        op.rewrite_as_imm(0x12345);
        assert_eq!(op.as_imm(), 0x12345);
    }
}
