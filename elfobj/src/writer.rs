//! Two-phase ELF64 object emission: phase 1 lays out section offsets and
//! builds the string/symbol/relocation tables; phase 2 streams the file
//! cursor from 0, zero-padding between sections up to their computed
//! offsets.

use std::io::{self, Write};

use crate::constants::*;
use crate::header::{Elf64Ehdr, Elf64Rela, Elf64Shdr, Elf64Sym};
use crate::section::SectionAssembler;
use crate::symbol::{GlobalSymbol, Relocation, SectionRef};

/// Everything the writer needs to know about one assembled program.
/// `text` is already-encoded instruction bytes (the caller ran each
/// `Instruction` through `mc::encode` while building `.text`); this crate
/// has no dependency on the instruction model.
pub struct ObjectModel {
    pub text: Vec<u8>,
    pub data: Vec<u8>,
    pub bss_size: u64,
    /// Order fixes symbol table index: global `i` (0-based) is symtab
    /// index `1 + i`.
    pub globals: Vec<GlobalSymbol>,
    /// Defined `.text` label names, interned into `.strtab` for tooling
    /// convenience even though only `globals` get symbol table entries.
    pub text_labels: Vec<String>,
    pub relocations: Vec<Relocation>,
}

fn align_up(offset: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two() || alignment == 0);
    if alignment <= 1 {
        return offset;
    }
    let rem = offset % alignment;
    if rem == 0 {
        offset
    } else {
        offset + (alignment - rem)
    }
}

struct Layout {
    ehdr_size: u64,
    text_offset: u64,
    data_offset: u64,
    bss_offset: u64,
    strtab_offset: u64,
    symtab_offset: u64,
    rela_offset: u64,
    shstrtab_offset: u64,
    shoff: u64,
}

/// Writes `model` as a relocatable ELF64 object for `EM_RISCV`.
pub fn write_object<W: Write>(w: &mut W, model: &ObjectModel) -> io::Result<()> {
    // .strtab: leading NUL, then one NUL-terminated name per global/extern
    // symbol (in `globals` order, fixing each one's st_name), then every
    // defined text label's name (interned only, not symbol table entries).
    let mut strtab = SectionAssembler::new();
    strtab.append_u8(0);
    let global_name_offsets: Vec<u32> = model.globals.iter().map(|g| strtab.append_cstr(&g.name)).collect();
    for label in &model.text_labels {
        strtab.append_cstr(label);
    }

    // .shstrtab: fixed section-name set.
    let mut shstrtab = SectionAssembler::new();
    shstrtab.append_u8(0);
    let mut shstrtab_name_offsets = [0u32; 8];
    for (i, name) in SECTION_NAMES.iter().enumerate().skip(1) {
        shstrtab_name_offsets[i] = shstrtab.append_cstr(name);
    }

    // Symbol table: null, globals/externs, then one per real section.
    let mut symbols = vec![Elf64Sym::default()];
    for (global, name_off) in model.globals.iter().zip(&global_name_offsets) {
        symbols.push(Elf64Sym::new(*name_off, STB_GLOBAL, STT_NOTYPE, global.section.shndx(), global.value));
    }
    let section_shndx_for_symtab: [u16; 6] = [
        SHNDX_TEXT,
        SHNDX_DATA,
        SHNDX_BSS,
        SHNDX_STRTAB,
        SHNDX_SYMTAB,
        SHNDX_RELA_TEXT,
    ];
    for shndx in section_shndx_for_symtab {
        symbols.push(Elf64Sym::new(0, STB_LOCAL, STT_SECTION, shndx, 0));
    }
    let local_symbol_count = section_shndx_for_symtab.len() as u32;

    let relocations: Vec<Elf64Rela> = model
        .relocations
        .iter()
        .map(|r| Elf64Rela {
            r_offset: r.offset,
            r_info: elf64_r_info(r.symbol_index, r.reloc_type),
            r_addend: r.addend,
        })
        .collect();

    // Phase 1: layout.
    let mut cursor = SIZEOF_EHDR;
    let text_offset = align_up(cursor, 2);
    cursor = text_offset + model.text.len() as u64;
    let data_offset = align_up(cursor, 1);
    cursor = data_offset + model.data.len() as u64;
    let bss_offset = align_up(cursor, 1); // SHT_NOBITS: occupies 0 file bytes
    let strtab_offset = align_up(cursor, 1);
    cursor = strtab_offset + strtab.len() as u64;
    let symtab_offset = align_up(cursor, 8);
    cursor = symtab_offset + symbols.len() as u64 * SIZEOF_SYM;
    let rela_offset = align_up(cursor, 8);
    cursor = rela_offset + relocations.len() as u64 * SIZEOF_RELA;
    let shstrtab_offset = align_up(cursor, 1);
    cursor = shstrtab_offset + shstrtab.len() as u64;
    let shoff = align_up(cursor, 8);

    let layout = Layout {
        ehdr_size: SIZEOF_EHDR,
        text_offset,
        data_offset,
        bss_offset,
        strtab_offset,
        symtab_offset,
        rela_offset,
        shstrtab_offset,
        shoff,
    };

    let shdrs = build_section_headers(
        model,
        &layout,
        &shstrtab_name_offsets,
        strtab.len() as u64,
        shstrtab.len() as u64,
        symbols.len() as u64,
        local_symbol_count,
        relocations.len() as u64,
    );

    let ehdr = Elf64Ehdr {
        e_type: ET_REL,
        e_machine: EM_RISCV,
        e_flags: EF_RISCV_RVC | EF_RISCV_FLOAT_ABI_DOUBLE,
        e_entry: 0,
        e_shoff: layout.shoff,
        e_shnum: SECTION_NAMES.len() as u16,
        e_shstrndx: SHNDX_SHSTRTAB,
    };

    // Phase 2: emit, zero-padding the cursor up to each computed offset.
    let mut pos = 0u64;
    ehdr.write(w)?;
    pos += layout.ehdr_size;

    pos = pad_to(w, pos, layout.text_offset)?;
    w.write_all(&model.text)?;
    pos += model.text.len() as u64;

    pos = pad_to(w, pos, layout.data_offset)?;
    w.write_all(&model.data)?;
    pos += model.data.len() as u64;

    // .bss contributes zero bytes on disk; the next pad_to spans its gap.
    pos = pad_to(w, pos, layout.strtab_offset)?;
    w.write_all(strtab.bytes())?;
    pos += strtab.len() as u64;

    pos = pad_to(w, pos, layout.symtab_offset)?;
    for sym in &symbols {
        sym.write(w)?;
    }
    pos += symbols.len() as u64 * SIZEOF_SYM;

    pos = pad_to(w, pos, layout.rela_offset)?;
    for rela in &relocations {
        rela.write(w)?;
    }
    pos += relocations.len() as u64 * SIZEOF_RELA;

    pos = pad_to(w, pos, layout.shstrtab_offset)?;
    w.write_all(shstrtab.bytes())?;
    pos += shstrtab.len() as u64;

    let _ = pad_to(w, pos, layout.shoff)?;
    for shdr in &shdrs {
        shdr.write(w)?;
    }

    Ok(())
}

fn pad_to<W: Write>(w: &mut W, pos: u64, target: u64) -> io::Result<u64> {
    debug_assert!(target >= pos, "layout offsets must be monotonically increasing");
    if target > pos {
        let zeros = vec![0u8; (target - pos) as usize];
        w.write_all(&zeros)?;
    }
    Ok(target)
}

fn build_section_headers(
    model: &ObjectModel,
    layout: &Layout,
    shstrtab_name_offsets: &[u32; 8],
    strtab_len: u64,
    shstrtab_len: u64,
    symbol_count: u64,
    local_symbol_count: u32,
    reloc_count: u64,
) -> Vec<Elf64Shdr> {
    vec![
        Elf64Shdr::default(), // NULL
        Elf64Shdr {
            sh_name: shstrtab_name_offsets[1],
            sh_type: SHT_PROGBITS,
            sh_flags: SHF_ALLOC | SHF_EXECINSTR,
            sh_offset: layout.text_offset,
            sh_size: model.text.len() as u64,
            sh_addralign: 2,
            ..Default::default()
        },
        Elf64Shdr {
            sh_name: shstrtab_name_offsets[2],
            sh_type: SHT_PROGBITS,
            sh_flags: SHF_ALLOC | SHF_WRITE,
            sh_offset: layout.data_offset,
            sh_size: model.data.len() as u64,
            sh_addralign: 1,
            ..Default::default()
        },
        Elf64Shdr {
            sh_name: shstrtab_name_offsets[3],
            sh_type: SHT_NOBITS,
            sh_flags: SHF_ALLOC | SHF_WRITE,
            sh_offset: layout.bss_offset,
            sh_size: model.bss_size,
            sh_addralign: 1,
            ..Default::default()
        },
        Elf64Shdr {
            sh_name: shstrtab_name_offsets[4],
            sh_type: SHT_STRTAB,
            sh_offset: layout.strtab_offset,
            sh_size: strtab_len,
            sh_addralign: 1,
            ..Default::default()
        },
        Elf64Shdr {
            sh_name: shstrtab_name_offsets[5],
            sh_type: SHT_SYMTAB,
            sh_offset: layout.symtab_offset,
            sh_size: symbol_count * SIZEOF_SYM,
            sh_link: SHNDX_STRTAB as u32,
            sh_info: local_symbol_count,
            sh_addralign: 8,
            sh_entsize: SIZEOF_SYM,
        },
        Elf64Shdr {
            sh_name: shstrtab_name_offsets[6],
            sh_type: SHT_RELA,
            sh_flags: SHF_INFO_LINK,
            sh_offset: layout.rela_offset,
            sh_size: reloc_count * SIZEOF_RELA,
            sh_link: SHNDX_SYMTAB as u32,
            sh_info: SHNDX_TEXT as u32,
            sh_addralign: 8,
            sh_entsize: SIZEOF_RELA,
        },
        Elf64Shdr {
            sh_name: shstrtab_name_offsets[7],
            sh_type: SHT_STRTAB,
            sh_offset: layout.shstrtab_offset,
            sh_size: shstrtab_len,
            sh_addralign: 1,
            ..Default::default()
        },
    ]
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_model() -> ObjectModel {
        ObjectModel {
            text: vec![0x93, 0x00, 0x50, 0x00], // addi x1, x0, 5
            data: vec![0xef, 0xbe, 0xad, 0xde],
            bss_size: 0,
            globals: vec![GlobalSymbol::new("main", SectionRef::Text, 0)],
            text_labels: vec!["main".to_string()],
            relocations: vec![],
        }
    }

    #[test]
    fn header_magic_and_machine() {
        let model = sample_model();
        let mut buf = Vec::new();
        write_object(&mut buf, &model).unwrap();
        assert_eq!(&buf[0..4], &[0x7f, b'E', b'L', b'F']);
        let e_machine = u16::from_le_bytes([buf[18], buf[19]]);
        assert_eq!(e_machine, EM_RISCV);
    }

    #[test]
    fn shoff_matches_actual_stream_length_up_to_section_headers() {
        let model = sample_model();
        let mut buf = Vec::new();
        write_object(&mut buf, &model).unwrap();
        let e_shoff = u64::from_le_bytes(buf[40..48].try_into().unwrap());
        assert_eq!(buf.len() as u64, e_shoff + 8 * SIZEOF_SHDR);
    }

    #[test]
    fn text_bytes_land_at_declared_offset() {
        let model = sample_model();
        let mut buf = Vec::new();
        write_object(&mut buf, &model).unwrap();
        let text_off = SIZEOF_EHDR as usize; // align_up(64, 2) == 64
        assert_eq!(&buf[text_off..text_off + 4], &model.text[..]);
    }
}
