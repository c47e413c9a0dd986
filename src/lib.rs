//! Instruction model and encoder for RISC-V RV64 G/C.
//!
//! This crate owns the three pieces of the assembler that never touch text:
//! the [`opcode`] table (mnemonic -> bit-layout template), the [`operand`]
//! model (a tagged union of what an instruction slot can hold) and the
//! [`encoder`], which stitches a resolved [`Instruction`] down into its 16-
//! or 32-bit word. Everything upstream of this (lexing, parsing, symbol
//! resolution) lives in the `rvasm` crate; everything downstream (section
//! layout, ELF serialization) lives in `elfobj`.

pub mod encoder;
pub mod error;
pub mod instruction;
pub mod opcode;
pub mod operand;
pub mod register;

pub use encoder::encode;
pub use error::{EncodingError, Result};
pub use instruction::Instruction;
pub use opcode::{EncodingField, OpcodeTemplate, OPCODES};
pub use operand::{Expression, Modifier, Operand};
pub use register::Register;
