//! Multi-unit linking: base-address assignment, relocation patching, and
//! iNES ROM packaging. Grounded in the source's `Linker` class
//! (`linker.cpp`/`.h`).
use std::collections::HashMap;
use std::fmt;

use crate::symbol::{AddrKind, SymbolKind};
use crate::unit::CompilationUnit;

pub const ROM_SIZE: usize = 0x10000;
pub const CODE_BASE: u16 = 0xC000;
const RESET_VECTOR_OFFSET: usize = 0xFFFC;

#[derive(Debug)]
pub enum Error {
    DuplicateSymbol(String),
    UndefinedSymbol(String),
    MissingMain,
    RomOverflow { wrote: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DuplicateSymbol(name) => write!(f, "symbol '{name}' is already defined in another unit"),
            Error::UndefinedSymbol(name) => write!(f, "undefined symbol '{name}'"),
            Error::MissingMain => write!(f, "no '_main' function defined"),
            Error::RomOverflow { wrote } => write!(f, "ROM size exceeded: wrote {wrote} bytes, PRG-ROM holds 16384"),
        }
    }
}

impl std::error::Error for Error {}

/// Which iNES mapper byte to write at header offset 6. The source always
/// writes mapper 6 (flags-6 = 0x01) despite never implementing bank
/// switching; a single 16KiB-PRG/8KiB-CHR image is properly NROM (mapper
/// 0). See the design ledger's resolution of this open question: exposed
/// as a knob rather than silently "fixed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mapper {
    #[default]
    Original,
    Nrom,
}

impl Mapper {
    fn flags6(self) -> u8 {
        match self {
            Mapper::Original => 0x01,
            Mapper::Nrom => 0x00,
        }
    }
}

/// Links a set of compiled translation units, in order, into a single
/// 64KiB iNES ROM image.
pub fn link(units: &mut [CompilationUnit], mapper: Mapper) -> Result<Vec<u8>, Error> {
    let mut global_addresses: HashMap<String, u16> = HashMap::new();
    let mut base = CODE_BASE;

    for unit in units.iter() {
        let unit_base = base;
        for sym_id in unit.symbols.all_symbol_ids() {
            let sym = unit.symbols.symbol(sym_id);
            if !sym.kind.intersects(SymbolKind::FUNCTION | SymbolKind::VARIABLE) || sym.addr_kind == AddrKind::Unset {
                continue;
            }
            if global_addresses.contains_key(&sym.unique_name) {
                return Err(Error::DuplicateSymbol(sym.unique_name.clone()));
            }
            let address = if sym.kind == SymbolKind::FUNCTION { sym.address.wrapping_add(unit_base) } else { sym.address };
            global_addresses.insert(sym.unique_name.clone(), address);
        }
        base = base.wrapping_add(unit.object_code.len() as u16);
    }

    if !global_addresses.contains_key("_main") {
        return Err(Error::MissingMain);
    }

    base = CODE_BASE;
    for unit in units.iter_mut() {
        let unit_base = base;
        for &offset in &unit.relocation.relative_addresses {
            let current = u16::from_le_bytes([unit.object_code[offset], unit.object_code[offset + 1]]);
            let patched = current.wrapping_add(unit_base);
            unit.object_code[offset..offset + 2].copy_from_slice(&patched.to_le_bytes());
        }
        base = base.wrapping_add(unit.object_code.len() as u16);
    }

    for unit in units.iter_mut() {
        for (offset, name) in unit.relocation.symbol_references.clone() {
            let address = global_addresses.get(&name).copied().ok_or_else(|| Error::UndefinedSymbol(name.clone()))?;
            unit.object_code[offset..offset + 2].copy_from_slice(&address.to_le_bytes());
        }
    }

    write_rom(units, global_addresses["_main"], mapper)
}

fn write_rom(units: &[CompilationUnit], main_address: u16, mapper: Mapper) -> Result<Vec<u8>, Error> {
    let mut rom = vec![0u8; ROM_SIZE];

    rom[0..4].copy_from_slice(b"NES\x1A");
    rom[4] = 0x01; // PRG-ROM count (16KiB units)
    rom[5] = 0x01; // CHR-ROM count (8KiB units)
    rom[6] = mapper.flags6();
    // rom[7..16] stay zero.

    let mut pos = 16usize;
    for unit in units {
        let end = pos + unit.object_code.len();
        if end > ROM_SIZE {
            return Err(Error::RomOverflow { wrote: end });
        }
        rom[pos..end].copy_from_slice(&unit.object_code);
        pos = end;
    }

    // Bootstrap stub: SEI; CLD; LDX #$FF; TXS; JMP _main
    let entry_point = (pos - 16) as u16 + CODE_BASE;
    rom[pos] = 0x78; // SEI
    pos += 1;
    rom[pos] = 0xD8; // CLD
    pos += 1;
    rom[pos] = 0xA2; // LDX #imm
    rom[pos + 1] = 0xFF;
    pos += 2;
    rom[pos] = 0x9A; // TXS
    pos += 1;
    rom[pos] = 0x4C; // JMP abs
    rom[pos + 1..pos + 3].copy_from_slice(&main_address.to_le_bytes());
    pos += 3;

    if pos >= ROM_SIZE {
        return Err(Error::RomOverflow { wrote: pos });
    }

    rom[RESET_VECTOR_OFFSET..RESET_VECTOR_OFFSET + 2].copy_from_slice(&entry_point.to_le_bytes());

    Ok(rom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::DataAllocator;

    fn temp_unit(src: &str, data: &mut DataAllocator) -> CompilationUnit {
        let mut path = std::env::temp_dir();
        path.push(format!("nescc-linker-test-{}-{}.c", std::process::id(), src.len()));
        std::fs::write(&path, src).unwrap();
        let unit = CompilationUnit::compile(&path, data).unwrap();
        let _ = std::fs::remove_file(&path);
        unit
    }

    #[test]
    fn rom_is_exactly_64kib_with_a_valid_header_and_reset_vector() {
        let mut data = DataAllocator::new();
        let mut units = vec![temp_unit("void main() { uint8_t x; x = 1; }", &mut data)];
        let rom = link(&mut units, Mapper::Nrom).unwrap();
        assert_eq!(rom.len(), ROM_SIZE);
        assert_eq!(&rom[0..4], b"NES\x1A");
        let reset_vector = u16::from_le_bytes([rom[0xFFFC], rom[0xFFFD]]);
        // The reset vector must point at the bootstrap's SEI (0x78).
        let target = reset_vector as usize - CODE_BASE as usize + 16;
        assert_eq!(rom[target], 0x78);
    }

    #[test]
    fn missing_main_is_rejected() {
        let mut data = DataAllocator::new();
        let mut units = vec![temp_unit("void helper() { }", &mut data)];
        assert!(matches!(link(&mut units, Mapper::Original), Err(Error::MissingMain)));
    }

    #[test]
    fn mapper_flag_is_configurable() {
        let mut data = DataAllocator::new();
        let mut units = vec![temp_unit("void main() { }", &mut data)];
        let rom = link(&mut units, Mapper::Original).unwrap();
        assert_eq!(rom[6], 0x01);

        let mut data2 = DataAllocator::new();
        let mut units2 = vec![temp_unit("void main() { }", &mut data2)];
        let rom2 = link(&mut units2, Mapper::Nrom).unwrap();
        assert_eq!(rom2[6], 0x00);
    }

    #[test]
    fn two_units_link_a_cross_unit_call() {
        let mut data = DataAllocator::new();
        let mut units = vec![
            temp_unit("uint8_t shared; void f() { shared = 1; }", &mut data),
            temp_unit("void f(); void main() { f(); }", &mut data),
        ];
        let rom = link(&mut units, Mapper::Nrom).unwrap();
        assert_eq!(rom.len(), ROM_SIZE);
    }
}
