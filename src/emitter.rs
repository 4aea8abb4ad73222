//! Byte emitter over a 64KiB address-space buffer, grounded in the source's
//! `Emitter` class.
//!
//! The source writes through a raw `unsigned char*` with no bounds checking
//! and logs each instruction it emits. Here every write goes through a
//! bounds-checked method that returns `Result`, and the instruction trace is
//! a `log::trace!` call rather than inline `LOG_INFO`.
use std::fmt;

use crate::opcode::{self, AddressingMode};

pub const ADDRESS_SPACE: usize = 0x10000;

#[derive(Debug)]
pub enum Error {
    UnknownInstruction { mnemonic: String, mode: AddressingMode },
    OutOfBounds { offset: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownInstruction { mnemonic, mode } => {
                write!(f, "no opcode for '{mnemonic}' in addressing mode {mode:?}")
            }
            Error::OutOfBounds { offset } => write!(f, "write at offset {offset:#06x} is outside the address space"),
        }
    }
}

impl std::error::Error for Error {}

/// A full 64KiB address-space buffer with a movable write cursor. Unwritten
/// bytes read back as `0xFF`, matching the source's fill pattern (and real
/// cartridge PRG-ROM, which floats high when unprogrammed).
pub struct Emitter {
    buffer: Vec<u8>,
    pos: usize,
}

impl Emitter {
    pub fn new() -> Self {
        Emitter { buffer: vec![0xFF; ADDRESS_SPACE], pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_write_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn skip_bytes(&mut self, count: usize) {
        self.pos += count;
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn emit_data(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let pos = self.pos;
        self.emit_data_at_pos(pos, bytes)?;
        self.pos += bytes.len();
        Ok(())
    }

    pub fn emit_data_at_pos(&mut self, pos: usize, bytes: &[u8]) -> Result<(), Error> {
        let end = pos.checked_add(bytes.len()).ok_or(Error::OutOfBounds { offset: pos })?;
        if end > self.buffer.len() {
            return Err(Error::OutOfBounds { offset: pos });
        }
        self.buffer[pos..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Emits one instruction: opcode byte followed by `mode.operand_len()`
    /// little-endian operand bytes truncated from `value`. Returns the
    /// offset the opcode byte was written at, so a caller can derive the
    /// operand's offset (`opcode_offset + 1`) for relocation bookkeeping.
    pub fn emit(&mut self, mnemonic: &str, mode: AddressingMode, value: u16) -> Result<usize, Error> {
        let opcode = opcode::opcode_for(mnemonic, mode)
            .ok_or_else(|| Error::UnknownInstruction { mnemonic: mnemonic.to_string(), mode })?;
        let opcode_offset = self.pos;
        log::trace!("{opcode_offset:#06x}: {mnemonic} {mode:?} {value:#06x}");

        self.emit_data(&[opcode])?;
        match mode.operand_len() {
            0 => {}
            1 => self.emit_data(&[value as u8])?,
            2 => self.emit_data(&value.to_le_bytes())?,
            n => unreachable!("addressing mode operand length {n} is not 0, 1, or 2"),
        }
        Ok(opcode_offset)
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_bytes_read_back_as_0xff() {
        let emitter = Emitter::new();
        assert_eq!(emitter.bytes()[0x1234], 0xFF);
    }

    #[test]
    fn emitting_an_absolute_instruction_writes_three_bytes() {
        let mut emitter = Emitter::new();
        let offset = emitter.emit("JSR", AddressingMode::Absolute, 0xC000).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(&emitter.bytes()[0..3], &[0x20, 0x00, 0xC0]);
        assert_eq!(emitter.position(), 3);
    }

    #[test]
    fn emitting_an_implied_instruction_writes_one_byte() {
        let mut emitter = Emitter::new();
        emitter.emit("RTS", AddressingMode::Implied, 0).unwrap();
        assert_eq!(emitter.position(), 1);
    }

    #[test]
    fn unknown_mnemonic_mode_pair_is_an_error() {
        let mut emitter = Emitter::new();
        assert!(emitter.emit("STA", AddressingMode::Immediate, 0).is_err());
    }

    #[test]
    fn set_write_pos_moves_the_cursor_without_touching_earlier_bytes() {
        let mut emitter = Emitter::new();
        emitter.emit("SEI", AddressingMode::Implied, 0).unwrap();
        emitter.set_write_pos(0x100);
        emitter.emit_data(&[0xAB]).unwrap();
        assert_eq!(emitter.bytes()[0], 0x78);
        assert_eq!(emitter.bytes()[0x100], 0xAB);
    }
}
