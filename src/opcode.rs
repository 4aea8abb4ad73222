//! 6502 mnemonic/addressing-mode to opcode byte table, grounded in the
//! source's `opcode.h`/`opcode.cpp` lookup table. Built once behind a
//! `OnceLock` rather than as a file-scope static initializer list, since
//! nothing else in the teacher's or pack's dependency stack reaches for a
//! lazy-static crate for this kind of table.
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    IndirectX,
    IndirectY,
    Relative,
}

impl AddressingMode {
    /// Number of operand bytes following the opcode byte itself.
    pub fn operand_len(self) -> u8 {
        match self {
            AddressingMode::Implied | AddressingMode::Accumulator => 0,
            AddressingMode::Immediate
            | AddressingMode::ZeroPage
            | AddressingMode::ZeroPageX
            | AddressingMode::ZeroPageY
            | AddressingMode::IndirectX
            | AddressingMode::IndirectY
            | AddressingMode::Relative => 1,
            AddressingMode::Absolute | AddressingMode::AbsoluteX | AddressingMode::AbsoluteY => 2,
        }
    }
}

type Table = HashMap<(&'static str, AddressingMode), u8>;
type ReverseTable = HashMap<u8, (&'static str, AddressingMode)>;

fn build_table() -> Table {
    use AddressingMode::*;
    let mut t = Table::new();
    let mut add = |mnemonic: &'static str, mode: AddressingMode, byte: u8| {
        t.insert((mnemonic, mode), byte);
    };

    add("LDA", Immediate, 0xA9);
    add("LDA", ZeroPage, 0xA5);
    add("LDA", ZeroPageX, 0xB5);
    add("LDA", Absolute, 0xAD);
    add("LDA", AbsoluteX, 0xBD);
    add("LDA", AbsoluteY, 0xB9);
    add("LDA", IndirectX, 0xA1);
    add("LDA", IndirectY, 0xB1);

    add("LDX", Immediate, 0xA2);
    add("LDX", ZeroPage, 0xA6);
    add("LDX", ZeroPageY, 0xB6);
    add("LDX", Absolute, 0xAE);
    add("LDX", AbsoluteY, 0xBE);

    add("LDY", Immediate, 0xA0);
    add("LDY", ZeroPage, 0xA4);
    add("LDY", ZeroPageX, 0xB4);
    add("LDY", Absolute, 0xAC);
    add("LDY", AbsoluteX, 0xBC);

    add("STA", ZeroPage, 0x85);
    add("STA", ZeroPageX, 0x95);
    add("STA", Absolute, 0x8D);
    add("STA", AbsoluteX, 0x9D);
    add("STA", AbsoluteY, 0x99);
    add("STA", IndirectX, 0x81);
    add("STA", IndirectY, 0x91);

    add("STX", ZeroPage, 0x86);
    add("STX", ZeroPageY, 0x96);
    add("STX", Absolute, 0x8E);

    add("STY", ZeroPage, 0x84);
    add("STY", ZeroPageX, 0x94);
    add("STY", Absolute, 0x8C);

    add("ADC", Immediate, 0x69);
    add("ADC", ZeroPage, 0x65);
    add("ADC", ZeroPageX, 0x75);
    add("ADC", Absolute, 0x6D);
    add("ADC", AbsoluteX, 0x7D);
    add("ADC", AbsoluteY, 0x79);
    add("ADC", IndirectX, 0x61);
    add("ADC", IndirectY, 0x71);

    add("SBC", Immediate, 0xE9);
    add("SBC", ZeroPage, 0xE5);
    add("SBC", ZeroPageX, 0xF5);
    add("SBC", Absolute, 0xED);
    add("SBC", AbsoluteX, 0xFD);
    add("SBC", AbsoluteY, 0xF9);
    add("SBC", IndirectX, 0xE1);
    add("SBC", IndirectY, 0xF1);

    add("CMP", Immediate, 0xC9);
    add("CMP", ZeroPage, 0xC5);
    add("CMP", ZeroPageX, 0xD5);
    add("CMP", Absolute, 0xCD);
    add("CMP", AbsoluteX, 0xDD);
    add("CMP", AbsoluteY, 0xD9);
    add("CMP", IndirectX, 0xC1);
    add("CMP", IndirectY, 0xD1);

    add("CPX", Immediate, 0xE0);
    add("CPX", ZeroPage, 0xE4);
    add("CPX", Absolute, 0xEC);

    add("CPY", Immediate, 0xC0);
    add("CPY", ZeroPage, 0xC4);
    add("CPY", Absolute, 0xCC);

    add("AND", Immediate, 0x29);
    add("AND", ZeroPage, 0x25);
    add("AND", ZeroPageX, 0x35);
    add("AND", Absolute, 0x2D);
    add("AND", AbsoluteX, 0x3D);
    add("AND", AbsoluteY, 0x39);
    add("AND", IndirectX, 0x21);
    add("AND", IndirectY, 0x31);

    add("BEQ", Relative, 0xF0);
    add("BNE", Relative, 0xD0);
    add("BCS", Relative, 0xB0);
    add("BMI", Relative, 0x30);
    add("BPL", Relative, 0x10);

    add("JMP", Absolute, 0x4C);
    add("JSR", Absolute, 0x20);

    add("RTS", Implied, 0x60);
    add("SEI", Implied, 0x78);
    add("CLD", Implied, 0xD8);
    add("TXS", Implied, 0x9A);

    t
}

fn table() -> &'static Table {
    static TABLE: OnceLock<Table> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

fn reverse_table() -> &'static ReverseTable {
    static REVERSE: OnceLock<ReverseTable> = OnceLock::new();
    REVERSE.get_or_init(|| table().iter().map(|(&key, &byte)| (byte, key)).collect())
}

/// Looks up the opcode byte for `mnemonic` under `mode`. `mnemonic` is
/// matched case-insensitively against the table's upper-case keys.
pub fn opcode_for(mnemonic: &str, mode: AddressingMode) -> Option<u8> {
    table().get(&(mnemonic_key(mnemonic), mode)).copied()
}

/// Looks up the `(mnemonic, addressing mode)` pair a raw opcode byte decodes
/// to. Used by disassembly tooling, not by the compiler's own codegen path.
pub fn decode(byte: u8) -> Option<(&'static str, AddressingMode)> {
    reverse_table().get(&byte).copied()
}

fn mnemonic_key(mnemonic: &str) -> &'static str {
    // The table is keyed by `&'static str` literals; map the caller's
    // (possibly lower-case) mnemonic back onto one of them.
    const KNOWN: &[&str] = &[
        "LDA", "LDX", "LDY", "STA", "STX", "STY", "ADC", "SBC", "CMP", "CPX", "CPY", "AND", "BEQ", "BNE", "BCS",
        "BMI", "BPL", "JMP", "JSR", "RTS", "SEI", "CLD", "TXS",
    ];
    let upper = mnemonic.to_ascii_uppercase();
    KNOWN.iter().find(|k| ***k == upper).copied().unwrap_or("")
}

/// True if `mnemonic` is a known instruction in any addressing mode.
pub fn is_known_mnemonic(mnemonic: &str) -> bool {
    !mnemonic_key(mnemonic).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_immediate_lda() {
        assert_eq!(opcode_for("LDA", AddressingMode::Immediate), Some(0xA9));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(opcode_for("lda", AddressingMode::Immediate), Some(0xA9));
    }

    #[test]
    fn unsupported_mode_for_a_mnemonic_returns_none() {
        assert_eq!(opcode_for("STA", AddressingMode::Immediate), None);
    }

    #[test]
    fn operand_lengths_match_addressing_mode_width() {
        assert_eq!(AddressingMode::Implied.operand_len(), 0);
        assert_eq!(AddressingMode::ZeroPage.operand_len(), 1);
        assert_eq!(AddressingMode::Absolute.operand_len(), 2);
    }

    #[test]
    fn decode_reverses_opcode_for() {
        assert_eq!(decode(0xA9), Some(("LDA", AddressingMode::Immediate)));
        assert_eq!(decode(0xFF), None);
    }
}
