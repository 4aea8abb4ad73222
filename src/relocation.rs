//! Per-unit relocation bookkeeping, grounded in the source's
//! `RelocationText` struct.
//!
//! Two kinds of patch a linker must apply after base addresses are known:
//! a relative address (a two-byte operand that needs the unit's base
//! address added to it) and a symbol reference (a two-byte operand that
//! needs the final address of a named symbol written in).
#[derive(Debug, Clone, Default)]
pub struct RelocationText {
    /// Byte offsets into a unit's object code that hold a two-byte address
    /// relative to that unit's own base address.
    pub relative_addresses: Vec<usize>,
    /// Byte offsets paired with the unique symbol name whose final address
    /// belongs there.
    pub symbol_references: Vec<(usize, String)>,
}

impl RelocationText {
    pub fn new() -> Self {
        RelocationText::default()
    }

    pub fn add_relative_address(&mut self, offset: usize) {
        self.relative_addresses.push(offset);
    }

    pub fn add_symbol_reference(&mut self, offset: usize, symbol: impl Into<String>) {
        self.symbol_references.push((offset, symbol.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_both_kinds_of_patch() {
        let mut reloc = RelocationText::new();
        reloc.add_relative_address(10);
        reloc.add_symbol_reference(20, "unit_main");
        assert_eq!(reloc.relative_addresses, vec![10]);
        assert_eq!(reloc.symbol_references, vec![(20, "unit_main".to_string())]);
    }
}
