//! A single translation unit carried through the whole pipeline: its own
//! token stream, AST, symbol table, object code, and relocation text.
//! Grounded in the source's `CompilationUnit` struct.
use std::path::{Path, PathBuf};

use crate::analyser;
use crate::codegen::{CodeGenerator, DataAllocator};
use crate::emitter::Emitter;
use crate::parser::Parser;
use crate::preprocessor;
use crate::relocation::RelocationText;
use crate::symbol::SymbolTable;
use crate::token;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("reading '{path}': {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("{0}")]
    Preprocess(#[from] preprocessor::Error),
    #[error("{0}")]
    Tokenize(#[from] token::Error),
    #[error("{0}")]
    Parse(#[from] crate::parser::Error),
    #[error("unit failed semantic analysis with {0} error(s)")]
    Analysis(usize),
    #[error("{0}")]
    Codegen(#[from] crate::codegen::Error),
}

/// One source file carried through preprocessing, parsing, analysis, and
/// code generation, owning every artifact those passes produce. Dropped as
/// a whole once the linker has consumed its object code and relocations.
pub struct CompilationUnit {
    pub path: PathBuf,
    pub symbols: SymbolTable,
    pub object_code: Vec<u8>,
    pub relocation: RelocationText,
}

impl CompilationUnit {
    /// Runs the full per-unit pipeline: preprocess, parse, analyse,
    /// generate code. `data_allocator` is shared across every unit in a
    /// compilation run so RAM addresses never collide between units
    /// (matching the source's `main`, which constructs one `DataAllocator`
    /// before looping over input files).
    pub fn compile(path: &Path, data_allocator: &mut DataAllocator) -> Result<Self, Error> {
        let source = std::fs::read_to_string(path).map_err(|e| Error::Io { path: path.to_path_buf(), source: e })?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let tokens = preprocessor::preprocess_source(&source, dir)?;
        let mut ast = Parser::new(tokens).parse()?;

        let outcome = analyser::analyse(&mut ast);
        if outcome.failed() {
            for err in &outcome.errors {
                log::error!("{}: {err}", path.display());
            }
            return Err(Error::Analysis(outcome.errors.len()));
        }
        let mut symbols = outcome.symbols;

        let mut emitter = Emitter::new();
        let roots = ast.roots.clone();
        let relocation = CodeGenerator::new(&ast, &mut symbols, &mut emitter, data_allocator).generate(&roots)?;

        let object_code = emitter.bytes()[..emitter.position()].to_vec();

        Ok(CompilationUnit { path: path.to_path_buf(), symbols, object_code, relocation })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> tempfile_like::TempSource {
        tempfile_like::TempSource::new(contents)
    }

    /// Minimal scratch-file helper: this crate has no dev-dependency on a
    /// tempfile crate, so tests write into the OS temp directory directly
    /// and clean up on drop.
    mod tempfile_like {
        use std::path::PathBuf;

        pub struct TempSource {
            pub path: PathBuf,
        }

        impl TempSource {
            pub fn new(contents: &str) -> Self {
                let mut path = std::env::temp_dir();
                let unique = format!("nescc-test-{}-{}.c", std::process::id(), contents.len());
                path.push(unique);
                std::fs::write(&path, contents).unwrap();
                TempSource { path }
            }
        }

        impl Drop for TempSource {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    #[test]
    fn compiles_a_minimal_unit_end_to_end() {
        let src = "uint8_t add(uint8_t a, uint8_t b) { return a + b; } void main() { uint8_t x; x = add(2, 3); }";
        let temp = write_temp(src);
        let mut data = DataAllocator::new();
        let unit = CompilationUnit::compile(&temp.path, &mut data).unwrap();
        assert!(!unit.object_code.is_empty());
        assert!(unit.symbols.all_scopes_lookup("_add").is_some());
        assert!(unit.symbols.all_scopes_lookup("_main").is_some());
    }

    #[test]
    fn a_unit_with_a_semantic_error_fails_to_compile() {
        let src = "uint8_t main() { return missing; }";
        let temp = write_temp(src);
        let mut data = DataAllocator::new();
        let result = CompilationUnit::compile(&temp.path, &mut data);
        assert!(result.is_err());
    }
}
