use std::fmt;

use crate::instruction::SourceLoc;

/// Something [`crate::encoder::encode`] couldn't turn into a word.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum EncodingError {
    /// A template whose field widths don't sum to 16 or 32 bits. Per spec
    /// this can only happen if the opcode table itself is wrong, so it is
    /// treated as a programmer bug rather than a user-facing error.
    BitWidthMismatch { mnemonic: &'static str, got_bits: u32 },
    /// A compressed-form register operand (`RdC`/`Rs1C`/`Rs2C`/`Rs3C`)
    /// outside the `x8..=x15`/`f8..=f15` range the compressed encoding can
    /// address.
    CompressedRegisterOutOfRange { mnemonic: &'static str, loc: SourceLoc, reg: u8 },
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EncodingError::BitWidthMismatch { mnemonic, got_bits } => write!(
                f,
                "opcode table bug: \"{}\" encodes to {} bits (expected 16 or 32)",
                mnemonic, got_bits
            ),
            EncodingError::CompressedRegisterOutOfRange { loc, reg, mnemonic } => write!(
                f,
                "{}: error: register x{} is not in 8..=15, required by compressed form \"{}\"",
                loc, reg, mnemonic
            ),
        }
    }
}

impl std::error::Error for EncodingError {}

pub type Result<T> = std::result::Result<T, EncodingError>;
