//! A small C-like language compiler and linker targeting the 6502/NES,
//! producing an iNES ROM image.
//!
//! The pipeline, one module per stage: [`token`] and [`preprocessor`] turn
//! source text into a directive-expanded token stream, [`parser`] builds an
//! [`ast::Ast`], [`analyser`] resolves scopes/types and rewrites every name
//! to its unique form, [`codegen`] lowers the analysed tree to 6502 object
//! code plus a [`relocation::RelocationText`], and [`linker`] combines every
//! [`unit::CompilationUnit`] from a run into one ROM.

pub mod analyser;
pub mod ast;
pub mod codegen;
pub mod emitter;
pub mod error;
pub mod linker;
pub mod opcode;
pub mod operator;
pub mod parser;
pub mod preprocessor;
pub mod relocation;
pub mod symbol;
pub mod token;
pub mod unit;

pub use self::codegen::DataAllocator;
pub use self::error::CompileError;
pub use self::linker::Mapper;
pub use self::unit::CompilationUnit;
