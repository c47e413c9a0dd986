//! Plain-old-data ELF64 structures and their little-endian serialization.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Write};

use crate::constants::*;

#[derive(Clone, Debug, Default)]
pub struct Elf64Ehdr {
    pub e_type: u16,
    pub e_machine: u16,
    pub e_flags: u32,
    pub e_entry: u64,
    pub e_shoff: u64,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

impl Elf64Ehdr {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&[0x7f, b'E', b'L', b'F'])?;
        w.write_u8(ELFCLASS64)?;
        w.write_u8(ELFDATA2LSB)?;
        w.write_u8(EV_CURRENT)?;
        w.write_u8(ELFOSABI_NONE)?;
        w.write_all(&[0u8; 8])?; // e_ident padding, ABI version + reserved
        w.write_u16::<LittleEndian>(self.e_type)?;
        w.write_u16::<LittleEndian>(self.e_machine)?;
        w.write_u32::<LittleEndian>(EV_CURRENT as u32)?;
        w.write_u64::<LittleEndian>(self.e_entry)?;
        w.write_u64::<LittleEndian>(0)?; // e_phoff, unused (no program headers)
        w.write_u64::<LittleEndian>(self.e_shoff)?;
        w.write_u32::<LittleEndian>(self.e_flags)?;
        w.write_u16::<LittleEndian>(SIZEOF_EHDR as u16)?;
        w.write_u16::<LittleEndian>(0)?; // e_phentsize
        w.write_u16::<LittleEndian>(0)?; // e_phnum
        w.write_u16::<LittleEndian>(SIZEOF_SHDR as u16)?;
        w.write_u16::<LittleEndian>(self.e_shnum)?;
        w.write_u16::<LittleEndian>(self.e_shstrndx)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Elf64Shdr {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

impl Elf64Shdr {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.sh_name)?;
        w.write_u32::<LittleEndian>(self.sh_type)?;
        w.write_u64::<LittleEndian>(self.sh_flags)?;
        w.write_u64::<LittleEndian>(self.sh_addr)?;
        w.write_u64::<LittleEndian>(self.sh_offset)?;
        w.write_u64::<LittleEndian>(self.sh_size)?;
        w.write_u32::<LittleEndian>(self.sh_link)?;
        w.write_u32::<LittleEndian>(self.sh_info)?;
        w.write_u64::<LittleEndian>(self.sh_addralign)?;
        w.write_u64::<LittleEndian>(self.sh_entsize)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Elf64Sym {
    pub st_name: u32,
    pub st_info: u8,
    pub st_other: u8,
    pub st_shndx: u16,
    pub st_value: u64,
    pub st_size: u64,
}

impl Elf64Sym {
    pub fn new(name: u32, binding: u8, sym_type: u8, shndx: u16, value: u64) -> Elf64Sym {
        Elf64Sym {
            st_name: name,
            st_info: (binding << 4) | (sym_type & 0xf),
            st_other: 0,
            st_shndx: shndx,
            st_value: value,
            st_size: 0,
        }
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.st_name)?;
        w.write_u8(self.st_info)?;
        w.write_u8(self.st_other)?;
        w.write_u16::<LittleEndian>(self.st_shndx)?;
        w.write_u64::<LittleEndian>(self.st_value)?;
        w.write_u64::<LittleEndian>(self.st_size)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Elf64Rela {
    pub r_offset: u64,
    pub r_info: u64,
    pub r_addend: i64,
}

impl Elf64Rela {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<LittleEndian>(self.r_offset)?;
        w.write_u64::<LittleEndian>(self.r_info)?;
        w.write_i64::<LittleEndian>(self.r_addend)?;
        Ok(())
    }
}
