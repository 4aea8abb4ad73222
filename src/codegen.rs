//! AST-to-bytes lowering: expression evaluation through a tiny register
//! cache, control-flow branch patching, inline-assembly resolution, and
//! relocation-record emission. Grounded in the source's `CodeGenerator` and
//! `DataAllocator` classes (`code_generator.cpp`/`.h`), by far the largest
//! source of behavioural detail in this crate.
//!
//! Two deliberate departures from the source, both flagged in the design
//! ledger: branch displacements are encoded as standard 6502 two's
//! complement rather than the source's sign-magnitude scheme, and a
//! displacement that doesn't fit in `i8` is a reported error rather than a
//! `printf` that still emits the (wrong) byte.
use std::collections::HashMap;
use std::fmt;

use crate::ast::{Ast, ControlKind, Fixity, Node, NodeId};
use crate::emitter::Emitter;
use crate::opcode::{self, AddressingMode};
use crate::relocation::RelocationText;
use crate::symbol::{AddrKind, SymbolId, SymbolKind, SymbolTable};

#[derive(Debug)]
pub enum Error {
    UnsupportedExpression(&'static str),
    UnsupportedType(String),
    BranchDisplacementOverflow,
    UndefinedSymbol(String),
    InvalidAsmOperand(String),
    Emitter(crate::emitter::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedExpression(what) => write!(f, "code generation does not support {what}"),
            Error::UnsupportedType(ty) => write!(f, "code generation does not support type '{ty}'"),
            Error::BranchDisplacementOverflow => write!(f, "control statement body too large: branch displacement exceeds 127 bytes"),
            Error::UndefinedSymbol(name) => write!(f, "codegen: undefined symbol '{name}'"),
            Error::InvalidAsmOperand(op) => write!(f, "invalid inline-assembly operand '{op}'"),
            Error::Emitter(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<crate::emitter::Error> for Error {
    fn from(e: crate::emitter::Error) -> Self {
        Error::Emitter(e)
    }
}

/// Hands out fresh zero-page/RAM addresses for temporaries, globals, and
/// parameters. A single instance is shared across every translation unit
/// compiled in one run (matching the source's `main`, which constructs one
/// `DataAllocator` before the per-file loop), so two units never collide on
/// the same RAM address.
pub struct DataAllocator {
    next_addr: u16,
}

impl DataAllocator {
    pub const STACK_PAGE_START: u16 = 0x0100;
    pub const RAM_AFTER_STACK: u16 = 0x0200;
    pub const RAM_END: u16 = 0x0800;

    pub fn new() -> Self {
        DataAllocator { next_addr: 0 }
    }

    /// Allocates `bytes` contiguous addresses, skipping over the processor
    /// stack page (0x0100-0x01FF) if the request would land inside or
    /// straddle it.
    pub fn request_var_addr(&mut self, bytes: u16) -> Result<u16, Error> {
        if self.next_addr.saturating_add(bytes) >= Self::STACK_PAGE_START {
            self.next_addr = Self::RAM_AFTER_STACK;
        }
        let addr = self.next_addr;
        self.next_addr += bytes;
        if self.next_addr > Self::RAM_END {
            return Err(Error::UnsupportedExpression("more RAM than the 2KiB internal RAM provides"));
        }
        Ok(addr)
    }
}

impl Default for DataAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcReg {
    A,
    X,
    Y,
}

/// Describes where an expression's value lives. Compared by structural
/// equality (not the source's `memcmp` over the whole struct) so the
/// register cache can recognise "already loaded" operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    Value(u8),
    DataAddress { offset: u16, relative: Option<SymbolId> },
    CodeAddress { offset: u16, relative: Option<SymbolId> },
}

impl Operand {
    fn data(offset: u16) -> Operand {
        Operand::DataAddress { offset, relative: None }
    }

    fn of_symbol(sym: SymbolId, offset: u16) -> Operand {
        Operand::DataAddress { offset, relative: Some(sym) }
    }

    fn with_offset(self, add: u16) -> Operand {
        match self {
            Operand::DataAddress { offset, relative } => Operand::DataAddress { offset: offset + add, relative },
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchKind {
    Beq,
    Bne,
}

impl BranchKind {
    fn mnemonic(self) -> &'static str {
        match self {
            BranchKind::Beq => "BEQ",
            BranchKind::Bne => "BNE",
        }
    }
}

pub struct CodeGenerator<'a> {
    ast: &'a Ast,
    symbols: &'a mut SymbolTable,
    emitter: &'a mut Emitter,
    data: &'a mut DataAllocator,
    reloc: RelocationText,
    register_content: [Operand; 3],
    /// Per-function "last operand written by a return statement", matching
    /// the source's `mFuncRetAddrs`. Not reentrant: a recursive or
    /// mutually-interleaved call overwrites the entry before the caller
    /// reads it back. This language has no recursion in its core feature
    /// set, so the limitation is inert in practice (see design ledger).
    func_ret_addrs: HashMap<String, Operand>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(ast: &'a Ast, symbols: &'a mut SymbolTable, emitter: &'a mut Emitter, data: &'a mut DataAllocator) -> Self {
        CodeGenerator {
            ast,
            symbols,
            emitter,
            data,
            reloc: RelocationText::new(),
            register_content: [Operand::None; 3],
            func_ret_addrs: HashMap::new(),
        }
    }

    pub fn generate(mut self, roots: &[NodeId]) -> Result<RelocationText, Error> {
        for &id in roots {
            self.emit_node(id)?;
        }
        Ok(self.reloc)
    }

    fn reg_index(reg: ProcReg) -> usize {
        match reg {
            ProcReg::A => 0,
            ProcReg::X => 1,
            ProcReg::Y => 2,
        }
    }

    fn load_opcode(reg: ProcReg) -> &'static str {
        match reg {
            ProcReg::A => "LDA",
            ProcReg::X => "LDX",
            ProcReg::Y => "LDY",
        }
    }

    fn store_opcode(reg: ProcReg) -> &'static str {
        match reg {
            ProcReg::A => "STA",
            ProcReg::X => "STX",
            ProcReg::Y => "STY",
        }
    }

    fn cmp_opcode(reg: ProcReg) -> &'static str {
        match reg {
            ProcReg::A => "CMP",
            ProcReg::X => "CPX",
            ProcReg::Y => "CPY",
        }
    }

    fn cache_register(&mut self, reg: ProcReg, val: Operand) {
        self.register_content[Self::reg_index(reg)] = val;
    }

    fn register_contains(&self, reg: ProcReg, val: Operand) -> bool {
        self.register_content[Self::reg_index(reg)] == val
    }

    fn clear_register(&mut self, reg: ProcReg) {
        self.register_content[Self::reg_index(reg)] = Operand::None;
    }

    // ---- relocatable emission ----

    fn emit_relocated_address(&mut self, mnemonic: &str, mode: AddressingMode, value: u16) -> Result<usize, Error> {
        let opcode_offset = self.emitter.emit(mnemonic, mode, value)?;
        self.reloc.add_relative_address(self.emitter.position() - 2);
        Ok(opcode_offset)
    }

    fn emit_relocated_symbol(&mut self, mnemonic: &str, mode: AddressingMode, sym: SymbolId, offset: u16) -> Result<usize, Error> {
        let target = self.symbols.symbol(sym).address.wrapping_add(offset);
        let opcode_offset = self.emitter.emit(mnemonic, mode, target)?;
        let unique_name = self.symbols.symbol(sym).unique_name.clone();
        self.reloc.add_symbol_reference(self.emitter.position() - 2, unique_name);
        Ok(opcode_offset)
    }

    /// Emits `mnemonic` against `operand`'s address, relocating as needed.
    /// Used by load/store/compare/arithmetic, which all share this shape
    /// for `DataAddress`/`CodeAddress` operands.
    fn emit_addressed(&mut self, mnemonic: &str, operand: Operand) -> Result<(), Error> {
        match operand {
            Operand::None => Err(Error::UnsupportedExpression("an instruction operand with no address")),
            Operand::Value(v) => {
                self.emitter.emit(mnemonic, AddressingMode::Immediate, v as u16)?;
                Ok(())
            }
            Operand::DataAddress { offset, relative: Some(sym) } | Operand::CodeAddress { offset, relative: Some(sym) } => {
                self.emit_relocated_symbol(mnemonic, AddressingMode::Absolute, sym, offset)?;
                Ok(())
            }
            Operand::DataAddress { offset, relative: None } => {
                self.emitter.emit(mnemonic, AddressingMode::Absolute, offset)?;
                Ok(())
            }
            Operand::CodeAddress { offset, relative: None } => {
                self.emit_relocated_address(mnemonic, AddressingMode::Absolute, offset)?;
                Ok(())
            }
        }
    }

    fn emit_load(&mut self, reg: ProcReg, operand: Operand) -> Result<(), Error> {
        if self.register_contains(reg, operand) {
            return Ok(());
        }
        self.emit_addressed(Self::load_opcode(reg), operand)?;
        self.cache_register(reg, operand);
        Ok(())
    }

    fn emit_store_reg(&mut self, reg: ProcReg, operand: Operand) -> Result<(), Error> {
        match operand {
            Operand::None | Operand::Value(_) => {
                return Err(Error::UnsupportedExpression("a store into a non-memory operand"));
            }
            _ => {}
        }
        self.emit_addressed(Self::store_opcode(reg), operand)?;
        if self.register_contains(reg, operand) {
            self.clear_register(reg);
        }
        Ok(())
    }

    /// Loads `src` into A, then stores A into `dst`: the source's two-
    /// argument `EmitStore(src, dst)` overload.
    fn emit_store(&mut self, src: Operand, dst: Operand) -> Result<(), Error> {
        self.emit_load(ProcReg::A, src)?;
        self.emit_store_reg(ProcReg::A, dst)
    }

    fn emit_compare_against(&mut self, reg: ProcReg, operand: Operand) -> Result<(), Error> {
        match operand {
            Operand::CodeAddress { .. } => Err(Error::UnsupportedExpression("comparing against a code address")),
            _ => self.emit_addressed(Self::cmp_opcode(reg), operand),
        }
    }

    fn emit_compare(&mut self, reg: ProcReg, op1: Operand, op2: Operand) -> Result<(), Error> {
        if self.register_contains(reg, op2) {
            return self.emit_compare(reg, op2, op1);
        }
        self.emit_load(reg, op1)?;
        self.emit_compare_against(reg, op2)
    }

    fn emit_acc_arith(&mut self, mnemonic: &str, operand: Operand) -> Result<(), Error> {
        match operand {
            Operand::CodeAddress { .. } => return Err(Error::UnsupportedExpression("arithmetic against a code address")),
            _ => self.emit_addressed(mnemonic, operand)?,
        }
        self.clear_register(ProcReg::A);
        Ok(())
    }

    /// Emits a BEQ/BNE with a placeholder operand byte and returns the
    /// offset of its opcode, so the caller can patch the displacement once
    /// the branch target is known.
    fn emit_branch_placeholder(&mut self, kind: BranchKind) -> Result<usize, Error> {
        Ok(self.emitter.emit(kind.mnemonic(), AddressingMode::Relative, 0)?)
    }

    /// Emits a JMP/JSR with a placeholder absolute address and returns the
    /// offset of its opcode. The target is filled in later by `patch_jump`
    /// as a unit-relative `emitter.position()`, so (like `emit_relocated_address`)
    /// it is recorded in `relative_addresses` for the linker to rebase.
    fn emit_jump_placeholder(&mut self, mnemonic: &str) -> Result<usize, Error> {
        let opcode_offset = self.emitter.emit(mnemonic, AddressingMode::Absolute, 0)?;
        self.reloc.add_relative_address(self.emitter.position() - 2);
        Ok(opcode_offset)
    }

    /// Standard 6502 relative-branch encoding: two's complement signed
    /// displacement from the instruction following the branch.
    fn branch_displacement(branch_opcode_offset: usize, target: usize) -> Result<u8, Error> {
        let disp = target as i64 - (branch_opcode_offset as i64 + 2);
        if disp < i8::MIN as i64 || disp > i8::MAX as i64 {
            return Err(Error::BranchDisplacementOverflow);
        }
        Ok(disp as i8 as u8)
    }

    fn patch_branch(&mut self, branch_opcode_offset: usize, target: usize) -> Result<(), Error> {
        let disp = Self::branch_displacement(branch_opcode_offset, target)?;
        self.emitter.emit_data_at_pos(branch_opcode_offset + 1, &[disp])?;
        Ok(())
    }

    fn patch_jump(&mut self, jump_opcode_offset: usize, target: u16) -> Result<(), Error> {
        self.emitter.emit_data_at_pos(jump_opcode_offset + 1, &target.to_le_bytes())?;
        Ok(())
    }

    fn emit_jump(&mut self, mnemonic: &str, operand: Operand) -> Result<(), Error> {
        match operand {
            Operand::CodeAddress { offset, relative: Some(sym) } => {
                self.emit_relocated_symbol(mnemonic, AddressingMode::Absolute, sym, offset)?;
                Ok(())
            }
            Operand::CodeAddress { offset, relative: None } => {
                self.emit_relocated_address(mnemonic, AddressingMode::Absolute, offset)?;
                Ok(())
            }
            _ => Err(Error::UnsupportedExpression("a jump to a non-code-address operand")),
        }
    }

    // ---- symbol helpers ----

    fn lookup_named(&self, name: &str) -> Result<SymbolId, Error> {
        self.symbols
            .all_scopes_lookup(name)
            .ok_or_else(|| Error::UndefinedSymbol(name.to_string()))
    }

    fn ensure_address(&mut self, sym: SymbolId) -> Result<(), Error> {
        let (size, has_addr) = {
            let s = self.symbols.symbol(sym);
            (s.size, s.addr_kind != AddrKind::Unset)
        };
        if has_addr {
            return Ok(());
        }
        let addr = self.data.request_var_addr(size.max(1))?;
        let symbol = self.symbols.symbol_mut(sym);
        symbol.addr_kind = AddrKind::Absolute;
        symbol.address = addr;
        Ok(())
    }

    /// Collects a function's parameter symbols, in declaration order.
    fn param_symbols(&self, func_sym: SymbolId) -> Vec<SymbolId> {
        match self.symbols.symbol(func_sym).child_scope {
            Some(scope) => self
                .symbols
                .scope(scope)
                .symbols
                .iter()
                .copied()
                .filter(|&s| self.symbols.symbol(s).kind == SymbolKind::FUNC_PARAM)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Copies `size` bytes from `src` (made addressable first if it is a
    /// bare `Value`) into the byte(s) at `dst`, one byte at a time through
    /// A for multibyte types, or a single direct store for size 1.
    fn copy_bytes(&mut self, src: Operand, dst: Operand, size: u16) -> Result<(), Error> {
        if size <= 1 {
            self.emit_store(src, dst)?;
            return Ok(());
        }
        let src_addr = self.materialize(src)?;
        for offset in 0..size {
            self.emit_load(ProcReg::A, src_addr.with_offset(offset))?;
            self.emit_store_reg(ProcReg::A, dst.with_offset(offset))?;
        }
        Ok(())
    }

    /// Ensures a `Value` operand has a concrete memory address backing it
    /// (the source's `ConvertToAddress`), needed before it can be read
    /// byte-by-byte for a multibyte copy.
    fn materialize(&mut self, operand: Operand) -> Result<Operand, Error> {
        match operand {
            Operand::Value(_) => {
                let addr = self.data.request_var_addr(1)?;
                let dst = Operand::data(addr);
                self.emit_store(operand, dst)?;
                Ok(dst)
            }
            other => Ok(other),
        }
    }

    // ---- expressions ----

    fn emit_expression(&mut self, id: NodeId) -> Result<Operand, Error> {
        match self.ast.get(id).clone() {
            Node::Literal { token, value_type } => self.emit_literal(token, value_type),
            Node::Identifier { name, .. } => {
                let sym = self.lookup_named(&name)?;
                Ok(Operand::of_symbol(sym, 0))
            }
            Node::Call { function, args, .. } => self.emit_call(&function, &args),
            Node::BinaryOp { op, left, right, value_type } => self.emit_binop(&op, left, right, value_type),
            Node::UnaryOp { op, .. } => Err(Error::UnsupportedExpression(Box::leak(format!("unary operator '{op}'").into_boxed_str()))),
            other => Err(Error::UnsupportedExpression(Box::leak(format!("node {other:?} in expression position").into_boxed_str()))),
        }
    }

    fn emit_literal(&mut self, token: crate::token::Token, value_type: Option<String>) -> Result<Operand, Error> {
        use crate::token::TokenKind;
        match token.kind {
            TokenKind::IntLit | TokenKind::BoolLit => {
                let ty = value_type.unwrap_or_else(|| "uint8_t".to_string());
                if ty != "uint8_t" && ty != "bool" {
                    return Err(Error::UnsupportedType(ty));
                }
                Ok(Operand::Value(token.int_value as u8))
            }
            _ => Err(Error::UnsupportedType(value_type.unwrap_or_default())),
        }
    }

    fn emit_call(&mut self, function: &str, args: &[NodeId]) -> Result<Operand, Error> {
        let func_sym = self.lookup_named(function)?;
        let param_syms = self.param_symbols(func_sym);

        for (i, &arg) in args.iter().enumerate() {
            let arg_operand = self.emit_expression(arg)?;
            if let Some(&param) = param_syms.get(i) {
                let size = self.symbols.symbol(param).size;
                self.copy_bytes(arg_operand, Operand::of_symbol(param, 0), size)?;
            }
        }

        let func = self.symbols.symbol(func_sym);
        let jump_target = Operand::CodeAddress { offset: func.address, relative: Some(func_sym) };
        self.emit_jump("JSR", jump_target)?;

        if self.symbols.symbol(func_sym).type_name == "void" {
            Ok(Operand::None)
        } else {
            let unique_name = self.symbols.symbol(func_sym).unique_name.clone();
            Ok(self.func_ret_addrs.get(&unique_name).copied().unwrap_or(Operand::None))
        }
    }

    fn emit_binop(&mut self, op: &str, left: NodeId, right: NodeId, value_type: Option<String>) -> Result<Operand, Error> {
        let value_type = value_type.unwrap_or_else(|| "uint8_t".to_string());
        // Comparisons always produce a single 0/1 byte in the accumulator,
        // regardless of the common operand type the analyser recorded.
        let result_size = if value_type == "uint16_t" && !matches!(op, "==" | "!=") { 2 } else { 1 };
        let ret_addr = Operand::data(self.data.request_var_addr(result_size)?);

        let left_operand = self.emit_expression(left)?;
        let right_operand = self.emit_expression(right)?;

        match op {
            "+" | "-" => {
                if value_type != "uint8_t" {
                    return Err(Error::UnsupportedType(value_type));
                }
                self.emit_load(ProcReg::A, left_operand)?;
                self.emit_acc_arith(if op == "+" { "ADC" } else { "SBC" }, right_operand)?;
                self.emit_store_reg(ProcReg::A, ret_addr)?;
            }
            "==" | "!=" => {
                self.emit_compare(ProcReg::A, left_operand, right_operand)?;
                let kind = if op == "==" { BranchKind::Beq } else { BranchKind::Bne };
                let branch_pos = self.emit_branch_placeholder(kind)?;

                self.emit_load(ProcReg::A, Operand::Value(0))?;
                let jmp_pos = self.emit_jump_placeholder("JMP")?;

                let branch_dest = self.emitter.position();
                self.emit_load(ProcReg::A, Operand::Value(1))?;
                let jmp_dest = self.emitter.position() as u16;

                self.patch_branch(branch_pos, branch_dest)?;
                self.patch_jump(jmp_pos, jmp_dest)?;

                self.emit_store_reg(ProcReg::A, ret_addr)?;
            }
            // Assignment stores into the left operand, but (matching the
            // source faithfully) the expression's value is the freshly
            // allocated `ret_addr` above, not the assigned-to address --
            // never written to here. Harmless in practice since this
            // language only ever uses assignment as a statement.
            "=" => {
                self.emit_store(right_operand, left_operand)?;
            }
            other => return Err(Error::UnsupportedExpression(Box::leak(format!("binary operator '{other}'").into_boxed_str()))),
        }

        Ok(ret_addr)
    }

    // ---- statements ----

    fn emit_statement(&mut self, id: NodeId) -> Result<(), Error> {
        match self.ast.get(id).clone() {
            Node::VarDefStmt { name, initializer, .. } => {
                let sym = self.lookup_named(&name)?;
                self.ensure_address(sym)?;
                if let Some(init) = initializer {
                    let size = self.symbols.symbol(sym).size;
                    let value = self.emit_expression(init)?;
                    self.copy_bytes(value, Operand::of_symbol(sym, 0), size)?;
                }
                Ok(())
            }
            Node::ControlStmt { kind, cond, body, connected } => self.emit_control(kind, cond, body, connected),
            Node::ReturnStmt { function, value } => {
                if let Some(v) = value {
                    let operand = self.emit_expression(v)?;
                    if let Some(func) = function {
                        self.func_ret_addrs.insert(func, operand);
                    }
                }
                self.emitter.emit("RTS", AddressingMode::Implied, 0)?;
                Ok(())
            }
            Node::ExprStmt { expr } => {
                self.emit_expression(expr)?;
                Ok(())
            }
            Node::InlineAsmStmt { mnemonic, operand1, operand2 } => self.emit_inline_asm(&mnemonic, &operand1, &operand2),
            other => Err(Error::UnsupportedExpression(Box::leak(format!("statement node {other:?}").into_boxed_str()))),
        }
    }

    fn emit_control(&mut self, kind: ControlKind, cond: Option<NodeId>, body: NodeId, connected: Option<NodeId>) -> Result<(), Error> {
        match kind {
            ControlKind::If | ControlKind::ElseIf => {
                let cond = cond.expect("if/else-if always carries a condition");
                let cond_operand = self.emit_expression(cond)?;
                self.emit_load(ProcReg::A, cond_operand)?;

                let branch_pos = self.emit_branch_placeholder(BranchKind::Beq)?;
                self.emit_node(body)?;

                let jmp_pos = self.emit_jump_placeholder("JMP")?;
                let branch_dest = self.emitter.position();
                self.patch_branch(branch_pos, branch_dest)?;

                if let Some(next) = connected {
                    self.emit_node(next)?;
                }

                let end_pos = self.emitter.position() as u16;
                self.patch_jump(jmp_pos, end_pos)?;
                Ok(())
            }
            ControlKind::Else => self.emit_node(body),
            ControlKind::While => {
                let start = self.emitter.position();
                let cond = cond.expect("while always carries a condition");
                let cond_operand = self.emit_expression(cond)?;
                self.emit_load(ProcReg::A, cond_operand)?;

                let branch_pos = self.emit_branch_placeholder(BranchKind::Beq)?;
                self.emit_node(body)?;
                self.emit_jump("JMP", Operand::CodeAddress { offset: start as u16, relative: None })?;

                let branch_dest = self.emitter.position();
                self.patch_branch(branch_pos, branch_dest)?;
                Ok(())
            }
        }
    }

    fn emit_inline_asm(&mut self, mnemonic: &str, operand1: &str, operand2: &str) -> Result<(), Error> {
        let mnemonic = mnemonic.to_ascii_uppercase();

        if operand1.is_empty() {
            self.emitter.emit(&mnemonic, AddressingMode::Implied, 0)?;
            return Ok(());
        }

        let (mode, value) = self.parse_asm_operand(operand1, operand2)?;
        self.emitter.emit(&mnemonic, mode, value)?;
        Ok(())
    }

    /// Decides the addressing mode and operand value for an inline
    /// assembly statement's first operand, matching the source's
    /// `EmitInlineAssembly` heuristics:
    ///   - a name resolving to a known symbol -> Absolute, symbol address
    ///   - `#...` -> Immediate
    ///   - `A` -> Accumulator
    ///   - `$...` -> ZeroPage if the hex text is 2 characters (1 byte),
    ///     Absolute if it is 4 (2 bytes) -- judged by *textual length*, not
    ///     numeric value, preserved faithfully per the distilled spec.
    /// A second operand of `x`/`y` shifts zero-page/absolute into their
    /// indexed variant.
    fn parse_asm_operand(&mut self, operand1: &str, operand2: &str) -> Result<(AddressingMode, u16), Error> {
        if operand1 == "A" {
            return Ok((AddressingMode::Accumulator, 0));
        }
        if let Some(sym) = self.symbols.all_scopes_lookup(operand1) {
            return Ok((AddressingMode::Absolute, self.symbols.symbol(sym).address));
        }
        if let Some(rest) = operand1.strip_prefix('#') {
            let rest = rest.strip_prefix('$').unwrap_or(rest);
            let value = u16::from_str_radix(rest, if operand1.contains('$') { 16 } else { 10 })
                .map_err(|_| Error::InvalidAsmOperand(operand1.to_string()))?;
            return Ok((AddressingMode::Immediate, value));
        }
        if let Some(hex) = operand1.strip_prefix('$') {
            let value = u16::from_str_radix(hex, 16).map_err(|_| Error::InvalidAsmOperand(operand1.to_string()))?;
            let is_absolute = hex.len() > 2;
            let index = operand2.to_ascii_lowercase();
            let mode = match (is_absolute, index.as_str()) {
                (true, "x") => AddressingMode::AbsoluteX,
                (true, "y") => AddressingMode::AbsoluteY,
                (true, _) => AddressingMode::Absolute,
                (false, "x") => AddressingMode::ZeroPageX,
                (false, "y") => AddressingMode::ZeroPageY,
                (false, _) => AddressingMode::ZeroPage,
            };
            return Ok((mode, value));
        }
        Err(Error::InvalidAsmOperand(operand1.to_string()))
    }

    // ---- declarations ----

    fn emit_func_def(&mut self, name: &str, body: &Option<Vec<NodeId>>, return_type: &str) -> Result<(), Error> {
        let Some(body) = body else { return Ok(()) };
        let func_sym = self.lookup_named(name)?;

        let start = self.emitter.position() as u16;
        {
            let symbol = self.symbols.symbol_mut(func_sym);
            symbol.addr_kind = AddrKind::Absolute;
            symbol.address = start;
        }

        let param_syms = self.param_symbols(func_sym);

        // Absolute, fixed RAM slots for parameters (see design ledger's
        // resolution of the FuncParam addressing open question), not
        // stack-relative slots.
        for param in param_syms {
            self.ensure_address(param)?;
        }

        for &stmt in body {
            self.emit_node(stmt)?;
        }

        if return_type == "void" {
            self.emitter.emit("RTS", AddressingMode::Implied, 0)?;
        }

        let end = self.emitter.position() as u16;
        self.symbols.symbol_mut(func_sym).size = end - start;
        Ok(())
    }

    fn emit_struct_def(&mut self, name: &str, body: &Option<Vec<NodeId>>) -> Result<(), Error> {
        if body.is_none() {
            return Ok(());
        }
        let struct_sym = self.lookup_named(name)?;
        let symbol = self.symbols.symbol_mut(struct_sym);
        symbol.addr_kind = AddrKind::Absolute;
        symbol.address = self.emitter.position() as u16;
        Ok(())
    }

    fn emit_node(&mut self, id: NodeId) -> Result<(), Error> {
        match self.ast.get(id).clone() {
            Node::FuncDef { name, body, return_type, .. } => self.emit_func_def(&name, &body, &return_type),
            Node::StructDef { name, body } => self.emit_struct_def(&name, &body),
            Node::Block { body } => {
                for stmt in body {
                    self.emit_node(stmt)?;
                }
                Ok(())
            }
            Node::InlineAsmStmt { mnemonic, operand1, operand2 } => self.emit_inline_asm(&mnemonic, &operand1, &operand2),
            _ => self.emit_statement(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::analyse;
    use crate::parser::Parser;
    use crate::token::tokenize_all;

    fn compile(src: &str) -> (Vec<u8>, RelocationText, SymbolTable) {
        let tokens = tokenize_all(src).unwrap();
        let mut ast = Parser::new(tokens).parse().unwrap();
        let outcome = analyse(&mut ast);
        assert!(!outcome.failed(), "{:?}", outcome.errors);
        let mut symbols = outcome.symbols;
        let mut emitter = Emitter::new();
        let mut data = DataAllocator::new();
        let roots = ast.roots.clone();
        let reloc = CodeGenerator::new(&ast, &mut symbols, &mut emitter, &mut data).generate(&roots).unwrap();
        (emitter.into_bytes(), reloc, symbols)
    }

    #[test]
    fn arithmetic_and_return_emits_adc_and_rts() {
        let (code, _, _) = compile("uint8_t add(uint8_t a, uint8_t b) { return a + b; } void main() { uint8_t x; x = add(2, 3); }");
        // ADC opcode byte must appear somewhere in the emitted code.
        assert!(code[..200].contains(&0x6D) || code[..200].contains(&0x65) || code[..200].contains(&0x69));
        // RTS appears at least twice (add's explicit return, main's implicit one).
        assert!(code[..200].iter().filter(|&&b| b == 0x60).count() >= 2);
    }

    #[test]
    fn if_without_else_emits_one_conditional_branch() {
        let (code, _, _) = compile("void main() { uint8_t x; if (x == 1) { x = 2; } }");
        // BEQ opcode appears exactly once for the `if`'s guard branch.
        assert_eq!(code[..100].iter().filter(|&&b| b == 0xF0).count(), 1);
    }

    #[test]
    fn equality_expression_emits_a_compare_and_a_branch() {
        let (code, _, _) = compile("void main() { uint8_t a; uint8_t b; uint8_t c; c = a == b; }");
        assert!(code[..100].contains(&0xF0)); // BEQ
        assert!(code[..100].contains(&0xC9) || code[..100].contains(&0xCD)); // CMP immediate or absolute
    }

    #[test]
    fn inline_asm_with_zero_page_hex_operand() {
        let (code, _, _) = compile("void main() { __asm lda $00; }");
        assert_eq!(code[0], 0xA5); // LDA zero page
        assert_eq!(code[1], 0x00);
    }

    #[test]
    fn inline_asm_with_absolute_hex_operand_by_text_length() {
        let (code, _, _) = compile("void main() { __asm lda $1234; }");
        assert_eq!(code[0], 0xAD); // LDA absolute
        assert_eq!(u16::from_le_bytes([code[1], code[2]]), 0x1234);
    }

    #[test]
    fn inline_asm_resolves_a_declared_symbol_and_records_a_relocation() {
        let (code, reloc, _) = compile("void main() { uint8_t note; __asm lda note; }");
        assert_eq!(code[0], 0xAD); // LDA absolute: variables are always addressed in Absolute mode
        assert_eq!(reloc.symbol_references.len(), 1);
    }

    #[test]
    fn branch_displacement_uses_twos_complement_encoding() {
        // A forward branch of +2 bytes should encode as 0x02, not as the
        // source's sign-magnitude 0x02 with bit 7 unset (same bit pattern
        // for small positive offsets -- the divergence shows up on the
        // negative/overflow side, exercised by the overflow test below).
        assert_eq!(CodeGenerator::branch_displacement(0, 4).unwrap(), 0x02);
    }

    #[test]
    fn branch_displacement_overflow_is_an_error() {
        assert!(CodeGenerator::branch_displacement(0, 1000).is_err());
    }

    #[test]
    fn data_allocator_skips_the_stack_page() {
        let mut alloc = DataAllocator::new();
        alloc.next_addr = 0x00F0;
        let addr = alloc.request_var_addr(32).unwrap();
        assert_eq!(addr, 0x0200);
    }
}
