//! The opcode table: parses the declarative `"offset[11:0] rs1[4:0] ... "`
//! bit-pattern strings (one per mnemonic, straight out of the ISA manual)
//! into a static, immutable slice of plain-data templates, built once at
//! first use.
//!
//! A pattern string is written MSB -> LSB, the same way the ISA manual
//! prints it. Internally we store each template's fields LSB -> MSB, which
//! is the order the [`encoder`](crate::encoder) actually walks them in: the
//! lowest bits of the word are produced first and later fields are shifted
//! in above them.

mod table;

use std::collections::HashMap;
use std::sync::OnceLock;

/// A bit-range list such as `20|10:1|11|19:12`, parsed into `(high, low)`
/// pairs in the order they were written (MSB-most chunk first).
pub type BitRanges = Vec<(u32, u32)>;

/// One field of an opcode template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodingField {
    /// Constant opcode/funct/padding bits.
    Static { bits: u32, width: u32 },
    Rd,
    Rs1,
    Rs2,
    Rs3,
    /// Compressed 3-bit register, encodes `reg - 8`.
    RdC,
    Rs1C,
    Rs2C,
    Rs3C,
    /// Signed immediate, built from `Operand::Imm`/`Expr`.
    Imm(BitRanges),
    /// Unsigned immediate.
    Uimm(BitRanges),
    /// Signed immediate with a "must not be zero" convention enforced by
    /// the parser, not the encoder.
    NzImm(BitRanges),
    /// PC-relative offset.
    Offset(BitRanges),
    /// Rounding mode (F/D extension), 3 bits.
    Rm,
    /// `pred` or `succ` fence bitmask, 4 bits.
    MemFence,
}

impl EncodingField {
    /// Total bit width this field contributes to the encoded word.
    pub fn width(&self) -> u32 {
        match self {
            EncodingField::Static { width, .. } => *width,
            EncodingField::Rd
            | EncodingField::Rs1
            | EncodingField::Rs2
            | EncodingField::Rs3 => 5,
            EncodingField::RdC | EncodingField::Rs1C | EncodingField::Rs2C | EncodingField::Rs3C => 3,
            EncodingField::Imm(r) | EncodingField::Uimm(r) | EncodingField::NzImm(r) | EncodingField::Offset(r) => {
                bit_ranges_width(r)
            }
            EncodingField::Rm => 3,
            EncodingField::MemFence => 4,
        }
    }

    /// Does this field consume a register operand?
    pub fn is_register(&self) -> bool {
        matches!(
            self,
            EncodingField::Rd
                | EncodingField::Rs1
                | EncodingField::Rs2
                | EncodingField::Rs3
                | EncodingField::RdC
                | EncodingField::Rs1C
                | EncodingField::Rs2C
                | EncodingField::Rs3C
        )
    }

    /// Is this a compressed (3-bit) register field?
    pub fn is_compressed_register(&self) -> bool {
        matches!(
            self,
            EncodingField::RdC | EncodingField::Rs1C | EncodingField::Rs2C | EncodingField::Rs3C
        )
    }

    /// The immediate-family bit ranges, if this field carries one.
    pub fn ranges(&self) -> Option<&BitRanges> {
        match self {
            EncodingField::Imm(r) | EncodingField::Uimm(r) | EncodingField::NzImm(r) | EncodingField::Offset(r) => {
                Some(r)
            }
            _ => None,
        }
    }
}

pub fn bit_ranges_width(ranges: &BitRanges) -> u32 {
    ranges.iter().map(|&(hi, lo)| hi - lo + 1).sum()
}

/// The signed width of an immediate: one more than the highest bit index
/// any of its ranges declares (e.g. a B-type branch's highest index is 12,
/// so its offset is a 13-bit signed value).
pub fn signed_width(ranges: &BitRanges) -> u32 {
    ranges.iter().map(|&(hi, _)| hi).max().unwrap_or(0) + 1
}

/// Whether an opcode's sole immediate field is I-type (one contiguous
/// range) as opposed to S-type (split across two). Per spec.md's Design
/// Notes, this is a static property of the template.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ImmediateShape {
    IType,
    SType,
    Other,
}

#[derive(Clone, Debug)]
pub struct OpcodeTemplate {
    pub name: &'static str,
    /// Fields in LSB -> MSB order (see module docs).
    pub fields: Vec<EncodingField>,
    pub is_compressed: bool,
}

impl OpcodeTemplate {
    pub fn total_width(&self) -> u32 {
        self.fields.iter().map(EncodingField::width).sum()
    }

    /// Classifies the template's immediate slot, used by the relocator to
    /// pick `_I` vs `_S` relocation types for `%lo`/`%pcrel_lo`.
    pub fn immediate_shape(&self) -> ImmediateShape {
        for field in &self.fields {
            if let Some(ranges) = field.ranges() {
                return if ranges.len() == 1 {
                    ImmediateShape::IType
                } else {
                    ImmediateShape::SType
                };
            }
        }
        ImmediateShape::Other
    }
}

fn parse_bit_ranges(inner: &str) -> BitRanges {
    inner
        .split('|')
        .map(|chunk| match chunk.find(':') {
            Some(idx) => {
                let hi: u32 = chunk[..idx].parse().expect("malformed bit-range high");
                let lo: u32 = chunk[idx + 1..].parse().expect("malformed bit-range low");
                (hi, lo)
            }
            None => {
                let bit: u32 = chunk.parse().expect("malformed bit-range literal");
                (bit, bit)
            }
        })
        .collect()
}

fn parse_field(token: &str) -> EncodingField {
    if !token.is_empty() && token.chars().all(|c| c == '0' || c == '1') {
        return EncodingField::Static {
            bits: u32::from_str_radix(token, 2).expect("malformed static bit pattern"),
            width: token.len() as u32,
        };
    }

    let bracket = token.find('[').unwrap_or_else(|| panic!("field \"{}\" has no bit-range brackets", token));
    let name = &token[..bracket];
    let inner = &token[bracket + 1..token.len() - 1];
    let ranges = parse_bit_ranges(inner);

    match name {
        "offset" => EncodingField::Offset(ranges),
        "imm" => EncodingField::Imm(ranges),
        "nzimm" | "nzuimm" => EncodingField::NzImm(ranges),
        "uimm" => EncodingField::Uimm(ranges),
        "rd" => EncodingField::Rd,
        "rd_" => EncodingField::RdC,
        "rs1" => EncodingField::Rs1,
        "rs1_" => EncodingField::Rs1C,
        "rs2" => EncodingField::Rs2,
        "rs2_" => EncodingField::Rs2C,
        "rs3" => EncodingField::Rs3,
        "rs3_" => EncodingField::Rs3C,
        "rm" => EncodingField::Rm,
        "pred" | "succ" => EncodingField::MemFence,
        other => panic!("unknown opcode table field name: \"{}\"", other),
    }
}

/// Parses one `"name", "pattern"` table entry. The pattern is written
/// MSB -> LSB (as in the ISA manual); tokens are reversed on the way in so
/// `fields` ends up LSB -> MSB, ready for the encoder's forward walk.
fn parse_template(name: &'static str, pattern: &str) -> OpcodeTemplate {
    let fields: Vec<EncodingField> = pattern.split_whitespace().rev().map(parse_field).collect();

    let normalized = normalize_mnemonic(name);
    OpcodeTemplate {
        name,
        fields,
        is_compressed: normalized.starts_with("c."),
    }
}

/// Normalises a mnemonic the way lookup does: lowercase, `_` -> `.`.
pub fn normalize_mnemonic(name: &str) -> String {
    name.to_ascii_lowercase().replace('_', ".")
}

fn build_table() -> HashMap<String, OpcodeTemplate> {
    table::RAW
        .iter()
        .map(|&(name, pattern)| {
            let template = parse_template(name, pattern);
            (normalize_mnemonic(name), template)
        })
        .collect()
}

static TABLE: OnceLock<HashMap<String, OpcodeTemplate>> = OnceLock::new();

/// Public handle to the opcode table, keyed by normalized mnemonic.
pub struct OpcodeTable;

pub static OPCODES: OpcodeTable = OpcodeTable;

impl OpcodeTable {
    /// Looks up a mnemonic, case-insensitive, with `_` normalised to `.`
    /// (so a table entry written `LR_D_AQ` matches surface syntax
    /// `lr.d.aq`).
    pub fn lookup(&self, mnemonic: &str) -> Option<&'static OpcodeTemplate> {
        TABLE.get_or_init(build_table).get(&normalize_mnemonic(mnemonic))
    }

    pub fn len(&self) -> usize {
        TABLE.get_or_init(build_table).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_template_sums_to_its_expected_width() {
        for template in TABLE.get_or_init(build_table).values() {
            let expected = if template.is_compressed { 16 } else { 32 };
            assert_eq!(
                template.total_width(),
                expected,
                "{} encodes to {} bits, expected {}",
                template.name,
                template.total_width(),
                expected
            );
        }
    }

    #[test]
    fn lookup_is_case_insensitive_and_normalizes_underscores() {
        assert!(OPCODES.lookup("addi").is_some());
        assert!(OPCODES.lookup("ADDI").is_some());
        assert!(OPCODES.lookup("lr.d.aq").is_some());
        assert!(OPCODES.lookup("LR_D_AQ").is_some());
        assert!(OPCODES.lookup("not.a.real.mnemonic").is_none());
    }

    #[test]
    fn lw_is_i_type_and_sw_is_s_type() {
        let lw = OPCODES.lookup("lw").unwrap();
        assert_eq!(lw.immediate_shape(), ImmediateShape::IType);
        let sw = OPCODES.lookup("sw").unwrap();
        assert_eq!(sw.immediate_shape(), ImmediateShape::SType);
    }

    #[test]
    fn jal_offset_signed_width_is_21_bits() {
        let jal = OPCODES.lookup("jal").unwrap();
        let ranges = jal.fields.iter().find_map(|f| f.ranges()).unwrap();
        assert_eq!(signed_width(ranges), 21);
        assert_eq!(bit_ranges_width(ranges), 20);
    }

    #[test]
    fn compressed_mnemonics_are_flagged() {
        assert!(OPCODES.lookup("c.addi").unwrap().is_compressed);
        assert!(!OPCODES.lookup("addi").unwrap().is_compressed);
    }
}
