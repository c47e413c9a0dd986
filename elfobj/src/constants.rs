//! ELF64/RISC-V constants from the generic ELF spec and the RISC-V ELF
//! psABI. Only the values this crate actually emits are listed.

pub const ELFCLASS64: u8 = 2;
pub const ELFDATA2LSB: u8 = 1;
pub const EV_CURRENT: u8 = 1;
pub const ELFOSABI_NONE: u8 = 0;

pub const ET_REL: u16 = 1;
pub const EM_RISCV: u16 = 243;

pub const EF_RISCV_RVC: u32 = 0x1;
pub const EF_RISCV_FLOAT_ABI_DOUBLE: u32 = 0x4;

pub const SHT_NULL: u32 = 0;
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_RELA: u32 = 4;
pub const SHT_NOBITS: u32 = 8;

pub const SHF_WRITE: u64 = 0x1;
pub const SHF_ALLOC: u64 = 0x2;
pub const SHF_EXECINSTR: u64 = 0x4;
pub const SHF_INFO_LINK: u64 = 0x40;

pub const STB_LOCAL: u8 = 0;
pub const STB_GLOBAL: u8 = 1;
pub const STT_NOTYPE: u8 = 0;
pub const STT_SECTION: u8 = 3;

pub const SHN_UNDEF: u16 = 0;

/// RISC-V relocation types (ELF psABI). Only the ones the Relocator can
/// emit are listed; values match the published psABI table.
pub const R_RISCV_NONE: u32 = 0;
pub const R_RISCV_BRANCH: u32 = 16;
pub const R_RISCV_JAL: u32 = 17;
pub const R_RISCV_GOT_HI20: u32 = 20;
pub const R_RISCV_TLS_GOT_HI20: u32 = 21;
pub const R_RISCV_TLS_GD_HI20: u32 = 22;
pub const R_RISCV_PCREL_HI20: u32 = 23;
pub const R_RISCV_PCREL_LO12_I: u32 = 24;
pub const R_RISCV_PCREL_LO12_S: u32 = 25;
pub const R_RISCV_HI20: u32 = 26;
pub const R_RISCV_LO12_I: u32 = 27;
pub const R_RISCV_LO12_S: u32 = 28;
pub const R_RISCV_TPREL_HI20: u32 = 29;
pub const R_RISCV_TPREL_ADD: u32 = 32;
pub const R_RISCV_RVC_BRANCH: u32 = 44;
pub const R_RISCV_RVC_JUMP: u32 = 45;

/// Builds `r_info` from a symbol table index and a relocation type, per
/// the ELF64 `ELF64_R_INFO` macro.
pub fn elf64_r_info(symbol_index: u32, reloc_type: u32) -> u64 {
    ((symbol_index as u64) << 32) | (reloc_type as u64)
}

pub const SIZEOF_EHDR: u64 = 64;
pub const SIZEOF_SHDR: u64 = 64;
pub const SIZEOF_SYM: u64 = 24;
pub const SIZEOF_RELA: u64 = 24;

/// Fixed section-header-table order (also used as 1-based section index:
/// `.text`=1, `.data`=2, `.bss`=3, ...).
pub const SECTION_NAMES: [&str; 8] = [
    "",
    ".text",
    ".data",
    ".bss",
    ".strtab",
    ".symtab",
    ".rela.text",
    ".shstrtab",
];

pub const SHNDX_TEXT: u16 = 1;
pub const SHNDX_DATA: u16 = 2;
pub const SHNDX_BSS: u16 = 3;
pub const SHNDX_STRTAB: u16 = 4;
pub const SHNDX_SYMTAB: u16 = 5;
pub const SHNDX_RELA_TEXT: u16 = 6;
pub const SHNDX_SHSTRTAB: u16 = 7;
