//! Assembler for RISC-V RV64 G/C: lexes and parses plain-text assembly,
//! resolves labels and symbolic relocations, encodes every instruction
//! through the sibling `mc` crate, and lays the result out as a
//! relocatable ELF64 object through `elfobj`.
//!
//! The main entry point is [`assemble`], which takes the full text of one
//! assembly source file and returns an [`elfobj::ObjectModel`] ready to be
//! serialized with [`elfobj::write_object`]/[`elfobj::write_file`].
//!
//! # Pipeline
//!
//! ```text
//! source text -> Lexer -> Parser -> (ParsedProgram) -> Relocator -> (ResolvedProgram) -> mc::encode (per instruction) -> ObjectModel
//! ```
//!
//! Pseudo-instructions (`li`, `la`, `call`, ...) are expanded inline during
//! parsing, so by the time the Relocator sees the instruction arena every
//! entry is a real opcode.

pub mod error;
pub mod lexer;
pub mod parser;
pub mod pseudo;
pub mod relocator;
pub mod symbols;

pub use error::{Error, Result};

/// Assembles one source file's full text into a relocatable ELF64 object
/// model, ready for [`elfobj::write_object`].
pub fn assemble(source: &str) -> Result<elfobj::ObjectModel> {
    let program = parser::parse(source)?;
    let resolved = relocator::resolve(program)?;

    let mut text = Vec::new();
    for inst in &resolved.instructions {
        let word = mc::encode(inst)?;
        if inst.is_compressed() {
            text.extend_from_slice(&(word as u16).to_le_bytes());
        } else {
            text.extend_from_slice(&word.to_le_bytes());
        }
    }

    Ok(elfobj::ObjectModel {
        text,
        data: resolved.data,
        bss_size: resolved.bss_size,
        globals: resolved.globals,
        text_labels: resolved.text_labels,
        relocations: resolved.relocations,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn addi_assembles_to_the_expected_word() {
        let model = assemble("addi x1, x0, 5\n").unwrap();
        assert_eq!(&model.text[0..4], &0x00500093u32.to_le_bytes());
    }

    #[test]
    fn forward_branch_produces_three_words() {
        // beq, then two `nop`s (each a real `addi`); `target:` itself emits
        // no instruction, so this is 3 words, not 4.
        let model = assemble("beq x1, x2, target\nnop\ntarget:\nnop\n").unwrap();
        assert_eq!(model.text.len(), 12);
        assert_eq!(u32::from_le_bytes([model.text[0], model.text[1], model.text[2], model.text[3]]), 0x00208463);
    }

    #[test]
    fn global_main_is_recorded_in_the_symbol_table() {
        let model = assemble(".global main\nmain:\naddi x0, x0, 0\n").unwrap();
        assert_eq!(model.globals.len(), 1);
        assert_eq!(model.globals[0].name, "main");
    }

    #[test]
    fn data_section_bytes_land_in_the_data_buffer() {
        let model = assemble(".data\n.word 0xdeadbeef\n").unwrap();
        assert_eq!(model.data, vec![0xef, 0xbe, 0xad, 0xde]);
    }
}
